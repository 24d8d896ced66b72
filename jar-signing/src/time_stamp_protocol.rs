// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Time-Stamp Protocol (TSP) / RFC 3161 client.

A time-stamp is obtained in three steps, each represented by its own type:

1. [TimeStampClient::build_request] digests the message and generates a
   fresh nonce, producing a [PreparedRequest].
2. [PreparedRequest::send] hands the request to a [TimeStampTransport],
   producing a [ReceivedResponse].
3. [ReceivedResponse::validate] checks that the response actually attests
   the request before handing out a [TimeStampToken].

The time-stamp authority is an untrusted peer. Validation insists on the
status, the message imprint, the nonce and (if one was requested) the policy
being echoed back. With a [TrustValidator], the token signature and its
certificate chain are verified as well.
*/

use {
    crate::{
        algorithm::{DigestAlgorithm, KeyFamily},
        asn1::{
            common::{integer_bytes, RawDer},
            rfc3161::{
                MessageImprint, PkiFailureInfo, PkiStatus, TimeStampReq, TimeStampResp, TstInfo,
                OID_CONTENT_TYPE_TST_INFO,
            },
            rfc5652::{
                Attribute, ContentInfo, IssuerAndSerialNumber, SignedData, SignerIdentifier,
                SignerInfo, OID_ID_SIGNED_DATA,
            },
        },
        trust::{TrustError, TrustPurpose, TrustValidator},
    },
    bcder::{
        decode::{Constructed, DecodeError},
        encode, ConstOid, Integer, Mode, OctetString, Oid,
    },
    bytes::Bytes,
    log::{debug, info},
    reqwest::IntoUrl,
    ring::rand::SecureRandom,
    std::{convert::Infallible, time::Duration},
    thiserror::Error,
    x509_certificate::{CapturedX509Certificate, X509CertificateError},
};

pub const HTTP_CONTENT_TYPE_REQUEST: &str = "application/timestamp-query";

pub const HTTP_CONTENT_TYPE_RESPONSE: &str = "application/timestamp-reply";

/// The message-digest signed attribute.
///
/// 1.2.840.113549.1.9.4
const OID_MESSAGE_DIGEST: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 4]);

#[derive(Debug, Error)]
pub enum TimeStampError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("ASN.1 decode error: {0}")]
    Asn1Decode(DecodeError<Infallible>),

    #[error("bad HTTP response: {0}")]
    Http(String),

    #[error("error generating random nonce")]
    Random,

    #[error(
        "time-stamp request rejected with status {status} ({}; failure info: {})",
        .text.as_deref().unwrap_or("no status text"),
        .fail_info.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string())
    )]
    Rejected {
        status: PkiStatus,
        text: Option<String>,
        fail_info: Option<PkiFailureInfo>,
    },

    #[error("time-stamp response does not contain a token")]
    MissingToken,

    #[error("malformed time-stamp token: {0}")]
    BadToken(&'static str),

    #[error("time-stamp token does not attest the requested message digest")]
    DigestMismatch,

    #[error("time-stamp token does not echo a nonce")]
    NonceMissing,

    #[error("time-stamp token nonce does not match request nonce")]
    NonceMismatch,

    #[error("time-stamp token policy {actual} does not match requested policy {requested}")]
    PolicyMismatch { requested: String, actual: String },

    #[error("time-stamp token signature does not verify")]
    BadSignature,

    #[error("time-stamp token certificate chain is not trusted: {0}")]
    UntrustedChain(#[source] TrustError),

    #[error("X.509 certificate error: {0}")]
    Certificate(#[from] X509CertificateError),
}

impl From<DecodeError<Infallible>> for TimeStampError {
    fn from(e: DecodeError<Infallible>) -> Self {
        Self::Asn1Decode(e)
    }
}

/// Carries encoded time-stamp requests to a time-stamp authority.
pub trait TimeStampTransport: Send + Sync {
    /// Send an encoded `TimeStampReq` and return the encoded `TimeStampResp`.
    fn round_trip(&self, request: &[u8]) -> Result<Vec<u8>, TimeStampError>;
}

/// Sends time-stamp requests over HTTP.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    url: reqwest::Url,
}

impl HttpTransport {
    /// Construct an instance posting to a URL.
    ///
    /// Without a timeout, requests wait as long as the server takes.
    pub fn new(url: impl IntoUrl, timeout: Option<Duration>) -> Result<Self, TimeStampError> {
        let mut builder = reqwest::blocking::ClientBuilder::new();

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url: url.into_url()?,
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

impl TimeStampTransport for HttpTransport {
    fn round_trip(&self, request: &[u8]) -> Result<Vec<u8>, TimeStampError> {
        debug!("sending time-stamp request to {}", self.url);

        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, HTTP_CONTENT_TYPE_REQUEST)
            .body(request.to_vec())
            .send()?;

        if !response.status().is_success() {
            return Err(TimeStampError::Http(format!(
                "server returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase());

        if content_type.as_deref() != Some(HTTP_CONTENT_TYPE_RESPONSE) {
            return Err(TimeStampError::Http(format!(
                "unexpected content type {}",
                content_type.as_deref().unwrap_or("(none)")
            )));
        }

        Ok(response.bytes()?.to_vec())
    }
}

/// Obtains time-stamp tokens from a time-stamp authority.
pub struct TimeStampClient {
    transport: Box<dyn TimeStampTransport>,
    digest_algorithm: DigestAlgorithm,
    policy: Option<Oid>,
    trust_validator: Option<Box<dyn TrustValidator>>,
}

impl TimeStampClient {
    /// Construct an instance talking through a transport.
    ///
    /// Messages are digested with SHA-256, no policy is requested and the
    /// token's certificate chain is not evaluated.
    pub fn new(transport: impl TimeStampTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            digest_algorithm: DigestAlgorithm::default(),
            policy: None,
            trust_validator: None,
        }
    }

    /// Construct an instance talking to a server over HTTP.
    pub fn http(url: impl IntoUrl, timeout: Option<Duration>) -> Result<Self, TimeStampError> {
        Ok(Self::new(HttpTransport::new(url, timeout)?))
    }

    /// Set the algorithm used to digest messages.
    pub fn digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Request a specific time-stamp policy.
    pub fn policy(mut self, policy: Oid) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Verify tokens and require their certificate chain to be trusted.
    pub fn trust_validator(mut self, validator: impl TrustValidator + 'static) -> Self {
        self.trust_validator = Some(Box::new(validator));
        self
    }

    /// Whether tokens are verified against a trust validator.
    pub fn is_strict(&self) -> bool {
        self.trust_validator.is_some()
    }

    /// Build a request to time-stamp a message.
    ///
    /// Every request carries a new random 64-bit nonce.
    pub fn build_request(&self, message: &[u8]) -> Result<PreparedRequest, TimeStampError> {
        let digest = self.digest_algorithm.digest(message);

        let mut random = [0u8; 8];
        ring::rand::SystemRandom::new()
            .fill(&mut random)
            .map_err(|_| TimeStampError::Random)?;

        let request = TimeStampReq {
            version: 1,
            message_imprint: MessageImprint {
                hash_algorithm: self.digest_algorithm.into(),
                hashed_message: OctetString::new(Bytes::from(digest)),
            },
            req_policy: self.policy.clone(),
            nonce: Some(Integer::from(u64::from_le_bytes(random))),
            cert_req: Some(true),
            extensions: None,
        };

        let der = RawDer::from_values(request.encode_ref()).as_slice().to_vec();

        Ok(PreparedRequest { request, der })
    }

    /// Obtain a validated time-stamp token for a message.
    pub fn time_stamp(&self, message: &[u8]) -> Result<TimeStampToken, TimeStampError> {
        let request = self.build_request(message)?;
        let response = request.send(self.transport.as_ref())?;

        response.validate(self.trust_validator.as_deref())
    }
}

/// A time-stamp request ready to be sent.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    request: TimeStampReq,
    der: Vec<u8>,
}

impl PreparedRequest {
    pub fn request(&self) -> &TimeStampReq {
        &self.request
    }

    /// The DER encoded request.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn nonce(&self) -> Option<&Integer> {
        self.request.nonce.as_ref()
    }

    /// Send the request and decode the response.
    pub fn send(self, transport: &dyn TimeStampTransport) -> Result<ReceivedResponse, TimeStampError> {
        let data = transport.round_trip(&self.der)?;

        let response = Constructed::decode(data.as_ref(), Mode::Ber, |cons| {
            TimeStampResp::take_from(cons)
        })?;

        Ok(ReceivedResponse {
            request: self.request,
            response,
        })
    }
}

/// A time-stamp response that hasn't been validated yet.
#[derive(Clone, Debug)]
pub struct ReceivedResponse {
    request: TimeStampReq,
    response: TimeStampResp,
}

impl ReceivedResponse {
    pub fn response(&self) -> &TimeStampResp {
        &self.response
    }

    /// Verify the response attests the request.
    ///
    /// The token signature and certificate chain are only verified when a
    /// trust validator is given.
    pub fn validate(
        self,
        trust_validator: Option<&dyn TrustValidator>,
    ) -> Result<TimeStampToken, TimeStampError> {
        let status = &self.response.status;

        if !status.status.is_granted() {
            return Err(TimeStampError::Rejected {
                status: status.status,
                text: status.status_string.as_ref().map(|s| s.to_string()),
                fail_info: status.fail_info,
            });
        }

        let raw = self
            .response
            .time_stamp_token
            .ok_or(TimeStampError::MissingToken)?;
        let content_info = ContentInfo::from_ber(raw.as_slice())?;

        if content_info.content_type != OID_ID_SIGNED_DATA {
            return Err(TimeStampError::BadToken("token is not signed-data"));
        }

        let signed_data = content_info.signed_data()?;

        if signed_data.content_info.content_type != OID_CONTENT_TYPE_TST_INFO {
            return Err(TimeStampError::BadToken("token does not contain TSTInfo"));
        }

        let tst_content = signed_data
            .content_info
            .content
            .as_ref()
            .ok_or(TimeStampError::BadToken("token does not contain TSTInfo"))?
            .to_bytes();

        let tst_info = Constructed::decode(tst_content.as_ref(), Mode::Ber, |cons| {
            TstInfo::take_from(cons)
        })?;

        if let Some(requested) = &self.request.req_policy {
            if &tst_info.policy != requested {
                return Err(TimeStampError::PolicyMismatch {
                    requested: requested.to_string(),
                    actual: tst_info.policy.to_string(),
                });
            }
        }

        let requested_imprint = &self.request.message_imprint;

        if tst_info.message_imprint.hash_algorithm.algorithm
            != requested_imprint.hash_algorithm.algorithm
            || tst_info.message_imprint.hashed_message.to_bytes()
                != requested_imprint.hashed_message.to_bytes()
        {
            return Err(TimeStampError::DigestMismatch);
        }

        match (&tst_info.nonce, &self.request.nonce) {
            (None, _) => return Err(TimeStampError::NonceMissing),
            (Some(actual), Some(requested)) if actual != requested => {
                return Err(TimeStampError::NonceMismatch)
            }
            (Some(_), None) => return Err(TimeStampError::NonceMismatch),
            _ => {}
        }

        if let Some(validator) = trust_validator {
            let chain = verify_token_signature(&signed_data, tst_content.as_ref())?;

            validator
                .validate(&chain, TrustPurpose::TimeStamping)
                .map_err(TimeStampError::UntrustedChain)?;
        }

        info!(
            "obtained time-stamp token {} from {}",
            hex::encode(integer_bytes(&tst_info.serial_number)),
            tst_info.gen_time.to_rfc3339()
        );

        Ok(TimeStampToken {
            raw,
            content_info,
            tst_info,
        })
    }
}

/// Verify the signature over a token's TSTInfo.
///
/// Returns the certificates embedded in the token.
fn verify_token_signature(
    signed_data: &SignedData,
    tst_content: &[u8],
) -> Result<Vec<CapturedX509Certificate>, TimeStampError> {
    let certificates = signed_data
        .certificates()
        .map(|cert| CapturedX509Certificate::from_der(cert.as_slice().to_vec()))
        .collect::<Result<Vec<_>, _>>()?;

    let signer = signed_data
        .signer_infos
        .first()
        .ok_or(TimeStampError::BadToken("token has no signer"))?;

    let sid = match &signer.sid {
        SignerIdentifier::IssuerAndSerialNumber(sid) => sid,
        SignerIdentifier::SubjectKeyIdentifier(_) => {
            return Err(TimeStampError::BadToken(
                "signer identified by subject key identifier",
            ))
        }
    };

    let mut signer_cert = None;
    for cert in &certificates {
        if &IssuerAndSerialNumber::from_certificate_der(cert.constructed_data())? == sid {
            signer_cert = Some(cert);
            break;
        }
    }
    let signer_cert =
        signer_cert.ok_or(TimeStampError::BadToken("signing certificate not in token"))?;

    let digest_algorithm = DigestAlgorithm::try_from(&signer.digest_algorithm.algorithm)
        .map_err(|_| TimeStampError::BadToken("unknown digest algorithm"))?;

    let signed_message = signed_message(signer, digest_algorithm, tst_content)?;

    let public_key = signer_cert.public_key_data();
    let algorithm = KeyFamily::for_signature_algorithm(&signer.signature_algorithm.algorithm)
        .and_then(|family| {
            family.verification_algorithm(
                &signer.signature_algorithm.algorithm,
                digest_algorithm,
                public_key.as_ref(),
            )
        })
        .ok_or(TimeStampError::BadToken("unsupported signature algorithm"))?;

    ring::signature::UnparsedPublicKey::new(algorithm, public_key.as_ref())
        .verify(&signed_message, &signer.signature.to_bytes())
        .map_err(|_| TimeStampError::BadSignature)?;

    Ok(certificates)
}

/// Resolve the data a signer signed.
///
/// With signed attributes, that is their DER encoding as a SET, which must
/// carry the digest of the content. Otherwise it is the content itself.
fn signed_message(
    signer: &SignerInfo,
    digest_algorithm: DigestAlgorithm,
    content: &[u8],
) -> Result<Vec<u8>, TimeStampError> {
    let signed_attributes = match &signer.signed_attributes {
        Some(attributes) => attributes,
        None => return Ok(content.to_vec()),
    };

    let attributes = signed_attributes.decode(|cons| {
        let mut attributes = vec![];

        while let Some(attribute) = Attribute::take_opt_from(cons)? {
            attributes.push(attribute);
        }

        Ok(attributes)
    })?;

    let digest = attributes
        .iter()
        .find(|attribute| attribute.typ == OID_MESSAGE_DIGEST)
        .ok_or(TimeStampError::BadToken("signed attributes lack message digest"))?
        .values
        .decode(|cons| OctetString::take_from(cons))?;

    if digest.to_bytes().as_ref() != digest_algorithm.digest(content).as_slice() {
        return Err(TimeStampError::BadSignature);
    }

    Ok(RawDer::from_values(encode::set(signed_attributes))
        .as_slice()
        .to_vec())
}

/// A validated time-stamp token.
#[derive(Clone, Debug)]
pub struct TimeStampToken {
    raw: RawDer,
    content_info: ContentInfo,
    tst_info: TstInfo,
}

impl TimeStampToken {
    /// The decoded token.
    pub fn content_info(&self) -> &ContentInfo {
        &self.content_info
    }

    /// The encoded token, byte for byte as the authority sent it.
    pub fn encoded(&self) -> &RawDer {
        &self.raw
    }

    pub fn tst_info(&self) -> &TstInfo {
        &self.tst_info
    }

    pub fn gen_time(&self) -> chrono::DateTime<chrono::Utc> {
        *self.tst_info.gen_time
    }

    pub fn serial_number(&self) -> &Integer {
        &self.tst_info.serial_number
    }

    pub fn policy(&self) -> &Oid {
        &self.tst_info.policy
    }
}
