// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    jar_manifest::{Manifest, MANIFEST_PATH},
    jar_signing::{
        algorithm::{parse_oid, signature_algorithm_from_name, SIGNATURE_ALGORITHM_NAMES},
        signature_file::signature_metadata_base,
        time_stamp_protocol::TimeStampClient,
        trust::AnchoredTrustValidator,
        DigestAlgorithm, JarSignError, JarSigner, JarSigningSettings, SignerName,
        SigningIdentity,
    },
    log::{error, info, warn, LevelFilter},
    std::{
        io::Read,
        path::{Path, PathBuf},
        str::FromStr,
        time::Duration,
    },
    x509_certificate::CapturedX509Certificate,
};

const SIGN_ABOUT: &str = "\
Sign Java archives.

Every entry of each archive is digested into META-INF/MANIFEST.MF. A
signature file (META-INF/<SIGNER>.SF) is derived from the manifest and
signed, producing a signature block (META-INF/<SIGNER>.RSA, .EC or .DSA).

Signatures of other signers are kept if the manifest didn't need any
changes. Otherwise they would no longer verify and are removed.

Signing material is read from PEM files given by --pem-source. Exactly one
PRIVATE KEY (PKCS#8) must be present, together with the certificate of that
key and optionally the certificates of its issuers.

By default a signed copy of each archive is written next to it, with a
-signed suffix. Use --output to choose the destination of a single archive
or --in-place to replace the archives being signed.

If --timestamp-url is given, signatures are time-stamped by that RFC 3161
time-stamp authority. Time-stamp tokens are only verified against trusted
certificates if --tsa-anchor is given.
";

const DEFAULT_SIGNER_NAME: &str = "CERT";

fn default_destination(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let file_name = match path.extension() {
        Some(ext) => format!("{}-signed.{}", stem, ext.to_string_lossy()),
        None => format!("{}-signed", stem),
    };

    path.with_file_name(file_name)
}

fn read_certificates(path: &str) -> Result<Vec<CapturedX509Certificate>, JarSignError> {
    warn!("reading trusted certificates from {}", path);
    let data = std::fs::read(path)?;

    let mut certs = vec![];

    for pem in pem::parse_many(&data).map_err(JarSignError::Pem)? {
        match pem.tag.as_str() {
            "CERTIFICATE" => {
                certs.push(CapturedX509Certificate::from_der(pem.contents)?);
            }
            tag => warn!("(unhandled PEM tag {}; ignoring)", tag),
        }
    }

    Ok(certs)
}

fn time_stamp_client_from_args(args: &ArgMatches) -> Result<Option<TimeStampClient>, JarSignError> {
    let url = match args.value_of("timestamp_url") {
        Some(url) if url != "none" => url,
        _ => return Ok(None),
    };

    let timeout = match args.value_of("timestamp_timeout") {
        Some(value) => {
            let seconds = u64::from_str(value).map_err(|_| {
                error!("invalid time-stamp timeout: {}", value);
                JarSignError::CliBadArgument
            })?;

            Some(Duration::from_secs(seconds))
        }
        None => None,
    };

    warn!("using time-stamp protocol server {}", url);
    let mut client = TimeStampClient::http(url, timeout)?;

    if let Some(value) = args.value_of("timestamp_digest") {
        client = client.digest_algorithm(DigestAlgorithm::from_str(value)?);
    }

    if let Some(value) = args.value_of("timestamp_policy") {
        client = client.policy(parse_oid(value)?);
    }

    if let Some(values) = args.values_of("tsa_anchor") {
        let mut anchors = vec![];
        for path in values {
            anchors.extend(read_certificates(path)?);
        }

        if anchors.is_empty() {
            error!("--tsa-anchor files contain no certificates");
            return Err(JarSignError::CliBadArgument);
        }

        client = client.trust_validator(AnchoredTrustValidator::new(anchors));
    }

    Ok(Some(client))
}

fn settings_from_args(args: &ArgMatches) -> Result<JarSigningSettings, JarSignError> {
    let signer_name = SignerName::new(args.value_of("signer_name").unwrap_or(DEFAULT_SIGNER_NAME))?;

    let mut pem_data = vec![];
    if let Some(values) = args.values_of("pem_source") {
        for pem_source in values {
            warn!("reading PEM data from {}", pem_source);
            pem_data.extend(std::fs::read(pem_source)?);
            pem_data.push(b'\n');
        }
    }

    let identity = SigningIdentity::from_pem_data(&pem_data, signer_name)?;
    let mut settings = JarSigningSettings::new(identity);

    if let Some(value) = args.value_of("digest") {
        settings.set_digest_algorithm(DigestAlgorithm::from_str(value)?);
    }

    if let Some(value) = args.value_of("signature_algorithm") {
        settings.set_signature_algorithm(signature_algorithm_from_name(value)?);
    }

    if let Some(value) = args.value_of("created_by") {
        settings.set_created_by(value);
    }

    settings.set_lenient(args.is_present("lenient"));

    if let Some(client) = time_stamp_client_from_args(args)? {
        settings.set_time_stamp_client(client);
    }

    Ok(settings)
}

fn command_sign(args: &ArgMatches) -> Result<(), JarSignError> {
    let paths = args
        .values_of("path")
        .ok_or(JarSignError::CliBadArgument)?
        .map(PathBuf::from)
        .collect::<Vec<_>>();

    let output = args.value_of("output").map(PathBuf::from);
    let in_place = args.is_present("in_place");

    if output.is_some() && paths.len() > 1 {
        error!("--output can only be used when signing a single archive");
        return Err(JarSignError::CliBadArgument);
    }

    let signer = JarSigner::new(settings_from_args(args)?);

    let mut failures = 0;

    for path in &paths {
        let result = if in_place {
            signer.sign_in_place(path)
        } else {
            let destination = output.clone().unwrap_or_else(|| default_destination(path));
            signer.sign(path, &destination)
        };

        match result {
            Ok(report) => {
                info!(
                    "signed {} as {} ({} entries digested; {} signatures retained; {} discarded{})",
                    path.display(),
                    report.signer_name,
                    report.entries_digested,
                    report.retained_signatures,
                    report.discarded_signatures,
                    if report.time_stamped {
                        "; time-stamped"
                    } else {
                        ""
                    }
                );
            }
            Err(e) => {
                error!("failed to sign {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        Err(JarSignError::CliGeneralError(format!(
            "{} of {} archives failed to sign",
            failures,
            paths.len()
        )))
    } else {
        Ok(())
    }
}

fn command_print_manifest(args: &ArgMatches) -> Result<(), JarSignError> {
    let path = args.value_of("path").ok_or(JarSignError::CliBadArgument)?;

    let mut archive = zip::ZipArchive::new(std::fs::File::open(path)?)?;

    let mut signature_entries = vec![];
    for index in 0..archive.len() {
        let name = archive.by_index_raw(index)?.name().to_string();
        if signature_metadata_base(&name).is_some() {
            signature_entries.push(name);
        }
    }

    let mut data = vec![];
    match archive.by_name(MANIFEST_PATH) {
        Ok(mut zf) => {
            zf.read_to_end(&mut data)?;
        }
        Err(zip::result::ZipError::FileNotFound) => {
            println!("(no {})", MANIFEST_PATH);
        }
        Err(e) => return Err(e.into()),
    }

    if !data.is_empty() {
        let manifest = if args.is_present("lenient") {
            Manifest::parse_lenient(&data)?
        } else {
            Manifest::parse(&data)?
        };

        println!("main attributes:");
        for (name, value) in manifest.main_section().attributes().iter() {
            println!("  {}: {}", name, value);
        }

        println!("sections: {}", manifest.len());
        for section in manifest.sections() {
            println!("  {}", section.name().unwrap_or_default());
            for (name, value) in section.attributes().iter() {
                println!("    {}: {}", name, value);
            }
        }
    }

    println!("signature entries: {}", signature_entries.len());
    for name in signature_entries {
        println!("  {}", name);
    }

    Ok(())
}

fn main_impl() -> Result<(), JarSignError> {
    let app = Command::new("Java archive signing in pure Rust")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Sign Java archives (JAR files)")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("print-manifest")
            .about("Print the manifest and signature entries of an archive")
            .arg(
                Arg::new("path")
                    .required(true)
                    .help("Path of archive to examine"),
            )
            .arg(
                Arg::new("lenient")
                    .long("lenient")
                    .help("Skip malformed manifest sections instead of failing"),
            ),
    );

    let app = app.subcommand(
        Command::new("sign")
            .about("Sign Java archives")
            .long_about(SIGN_ABOUT)
            .arg(
                Arg::new("path")
                    .required(true)
                    .multiple_values(true)
                    .help("Paths of archives to sign"),
            )
            .arg(
                Arg::new("pem_source")
                    .long("pem-source")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .required(true)
                    .help("Path to file containing PEM encoded certificate/key data"),
            )
            .arg(
                Arg::new("signer_name")
                    .long("signer-name")
                    .takes_value(true)
                    .help("Name of the signature file and block, upper cased and truncated to 8 characters (default CERT)"),
            )
            .arg(
                Arg::new("digest")
                    .long("digest")
                    .takes_value(true)
                    .possible_values(DigestAlgorithm::names())
                    .default_value("sha256")
                    .help("Digest algorithm for manifest and signature file digests"),
            )
            .arg(
                Arg::new("signature_algorithm")
                    .long("signature-algorithm")
                    .takes_value(true)
                    .possible_values(SIGNATURE_ALGORITHM_NAMES)
                    .help("Signature algorithm the signing key must produce"),
            )
            .arg(
                Arg::new("created_by")
                    .long("created-by")
                    .takes_value(true)
                    .help("Value of Created-By attributes"),
            )
            .arg(
                Arg::new("timestamp_url")
                    .long("timestamp-url")
                    .takes_value(true)
                    .help("URL of RFC 3161 time-stamp authority. Use `none` to disable"),
            )
            .arg(
                Arg::new("timestamp_policy")
                    .long("timestamp-policy")
                    .takes_value(true)
                    .requires("timestamp_url")
                    .help("OID of the time-stamp policy to request"),
            )
            .arg(
                Arg::new("timestamp_digest")
                    .long("timestamp-digest")
                    .takes_value(true)
                    .possible_values(DigestAlgorithm::names())
                    .requires("timestamp_url")
                    .help("Digest algorithm of the time-stamp message imprint"),
            )
            .arg(
                Arg::new("timestamp_timeout")
                    .long("timestamp-timeout")
                    .takes_value(true)
                    .requires("timestamp_url")
                    .help("Seconds to wait for the time-stamp authority"),
            )
            .arg(
                Arg::new("tsa_anchor")
                    .long("tsa-anchor")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .requires("timestamp_url")
                    .help("Path to PEM file with certificates trusted to issue time-stamps"),
            )
            .arg(
                Arg::new("lenient")
                    .long("lenient")
                    .help("Drop malformed manifest sections instead of failing"),
            )
            .arg(
                Arg::new("output")
                    .short('o')
                    .long("output")
                    .takes_value(true)
                    .conflicts_with("in_place")
                    .help("Path of the signed archive to create"),
            )
            .arg(
                Arg::new("in_place")
                    .long("in-place")
                    .help("Replace archives with their signed versions"),
            ),
    );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();

    match matches.subcommand() {
        Some(("print-manifest", args)) => command_print_manifest(args),
        Some(("sign", args)) => command_sign(args),
        _ => Err(JarSignError::CliUnknownCommand),
    }
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };

    std::process::exit(exit_code)
}
