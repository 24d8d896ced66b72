// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    bcder::{
        decode::{Constructed, DecodeError, Primitive, SliceSource, Source},
        encode::{self, PrimitiveContent, Values},
        Captured, Integer, Mode, Oid, Tag,
    },
    bytes::Bytes,
    chrono::{Datelike, NaiveDate, TimeZone, Timelike},
    std::{io::Write, ops::Deref, str::FromStr},
};

/// DER encoded bytes of one or more complete values, written out verbatim.
///
/// Used for the parts of signature structures we carry around without
/// interpreting them: certificates, attribute values, algorithm parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawDer(pub Bytes);

impl RawDer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Capture values so they can be embedded elsewhere.
    pub fn from_values(values: impl Values) -> Self {
        Self::from(Captured::from_values(Mode::Der, values))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the data.
    pub fn decode<F, T>(&self, op: F) -> Result<T, DecodeError<std::convert::Infallible>>
    where
        F: FnOnce(&mut Constructed<SliceSource>) -> Result<T, DecodeError<std::convert::Infallible>>,
    {
        Constructed::decode(self.as_slice(), Mode::Ber, op)
    }
}

impl From<Captured> for RawDer {
    fn from(captured: Captured) -> Self {
        Self(Bytes::copy_from_slice(captured.as_slice()))
    }
}

impl AsRef<[u8]> for RawDer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Values for RawDer {
    fn encoded_len(&self, _: Mode) -> usize {
        self.0.len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(&self.0)
    }
}

/// Take a SEQUENCE, retaining its complete encoding.
pub fn take_sequence_raw<S: Source>(
    cons: &mut Constructed<S>,
) -> Result<RawDer, DecodeError<S::Error>> {
    let content = cons.take_sequence(|cons| cons.capture_all())?;

    Ok(RawDer::from_values(encode::sequence(content)))
}

/// Take an optional SEQUENCE, retaining its complete encoding.
pub fn take_opt_sequence_raw<S: Source>(
    cons: &mut Constructed<S>,
) -> Result<Option<RawDer>, DecodeError<S::Error>> {
    let content = cons.take_opt_sequence(|cons| cons.capture_all())?;

    Ok(content.map(|content| RawDer::from_values(encode::sequence(content))))
}

/// Obtain the content octets of an INTEGER.
pub fn integer_bytes(v: &Integer) -> Vec<u8> {
    let mut res = vec![];
    // Writing to a Vec can't fail.
    let _ = PrimitiveContent::write_encoded(&v, Mode::Der, &mut res);

    res
}

/// Take a small non-negative INTEGER, as used for structure versions.
pub fn take_version<S: Source>(cons: &mut Constructed<S>) -> Result<u8, DecodeError<S::Error>> {
    let version = cons.take_primitive_if(Tag::INTEGER, Integer::i8_from_primitive)?;

    u8::try_from(version).map_err(|_| cons.content_err("negative version"))
}

/// Algorithm identifier.
///
/// ```ASN.1
/// AlgorithmIdentifier  ::=  SEQUENCE  {
///      algorithm               OBJECT IDENTIFIER,
///      parameters              ANY DEFINED BY algorithm OPTIONAL  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlgorithmIdentifier {
    pub algorithm: Oid,
    pub parameters: Option<RawDer>,
}

impl AlgorithmIdentifier {
    /// An identifier whose parameters are an explicit ASN.1 NULL.
    pub fn with_null_parameters(algorithm: Oid) -> Self {
        Self {
            algorithm,
            parameters: Some(RawDer::new(Bytes::from_static(&[0x05, 0x00]))),
        }
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| Self::from_sequence(cons))
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| Self::from_sequence(cons))
    }

    fn from_sequence<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let algorithm = Oid::take_from(cons)?;
        let parameters = cons.capture_all()?;

        Ok(Self {
            algorithm,
            parameters: if parameters.is_empty() {
                None
            } else {
                Some(parameters.into())
            },
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.algorithm.encode_ref(), self.parameters.as_ref()))
    }
}

impl Values for AlgorithmIdentifier {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// A GeneralizedTime value.
///
/// Decoding accepts fractional seconds, as emitted by many time-stamp
/// authorities. Encoding always uses whole seconds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneralizedTime(chrono::DateTime<chrono::Utc>);

impl Deref for GeneralizedTime {
    type Target = chrono::DateTime<chrono::Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<chrono::DateTime<chrono::Utc>> for GeneralizedTime {
    fn from(t: chrono::DateTime<chrono::Utc>) -> Self {
        Self(t)
    }
}

impl GeneralizedTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        match Self::parse(data.as_ref()) {
            Some(dt) => Ok(Self(dt)),
            None => Err(prim.content_err("malformed GeneralizedTime")),
        }
    }

    /// Parse `YYYYMMDDHHMMSS[.f+]Z`.
    fn parse(data: &[u8]) -> Option<chrono::DateTime<chrono::Utc>> {
        let s = std::str::from_utf8(data).ok()?;
        let s = s.strip_suffix('Z')?;

        if s.len() < 14 || !s.is_char_boundary(14) {
            return None;
        }

        let (whole, fraction) = s.split_at(14);

        if !whole.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let field = |range: std::ops::Range<usize>| u32::from_str(&whole[range]).ok();

        let year = i32::from_str(&whole[0..4]).ok()?;
        let date = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?;

        let nanos = if fraction.is_empty() {
            0
        } else {
            let digits = fraction.strip_prefix('.')?;

            if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }

            u32::from_str(&format!("{:0<9}", digits)).ok()?
        };

        let time = date.and_hms_nano_opt(field(8..10)?, field(10..12)?, field(12..14)?, nanos)?;

        Some(chrono::Utc.from_utc_datetime(&time))
    }
}

impl ToString for GeneralizedTime {
    fn to_string(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, bcder::ConstOid};

    const OID_EXAMPLE: ConstOid = Oid(&[42, 3, 4]);

    #[test]
    fn generalized_time() {
        let t = GeneralizedTime::parse(b"20220314150926Z").unwrap();
        assert_eq!(t.year(), 2022);
        assert_eq!(t.second(), 26);
        assert_eq!(GeneralizedTime(t).to_string(), "20220314150926Z");

        let t = GeneralizedTime::parse(b"20220314150926.125Z").unwrap();
        assert_eq!(t.timestamp_subsec_millis(), 125);
        assert_eq!(GeneralizedTime(t).to_string(), "20220314150926Z");

        assert!(GeneralizedTime::parse(b"20220314150926").is_none());
        assert!(GeneralizedTime::parse(b"20221314150926Z").is_none());
        assert!(GeneralizedTime::parse(b"20220314150926.Z").is_none());
        assert!(GeneralizedTime::parse(b"2022031415092aZ").is_none());
    }

    #[test]
    fn algorithm_identifier_parameters() {
        let oid = Oid(Bytes::copy_from_slice(OID_EXAMPLE.as_ref()));

        for ident in [
            AlgorithmIdentifier {
                algorithm: oid.clone(),
                parameters: None,
            },
            AlgorithmIdentifier::with_null_parameters(oid),
        ] {
            let der = RawDer::from_values(ident.encode_ref());
            let decoded = der.decode(|cons| AlgorithmIdentifier::take_from(cons)).unwrap();
            assert_eq!(decoded, ident);
        }
    }

    #[test]
    fn raw_sequence_capture() {
        let inner = encode::sequence((1u8.encode(), true.encode()));
        let outer = RawDer::from_values(encode::sequence((inner, 7u8.encode())));

        let (raw, seven) = outer
            .decode(|cons| {
                cons.take_sequence(|cons| {
                    let raw = take_sequence_raw(cons)?;
                    let seven = bcder::Integer::take_from(cons)?;
                    Ok((raw, seven))
                })
            })
            .unwrap();

        assert_eq!(raw.as_slice(), &[0x30, 0x06, 0x02, 0x01, 0x01, 0x01, 0x01, 0xff]);
        assert_eq!(seven, bcder::Integer::from(7u8));
    }
}
