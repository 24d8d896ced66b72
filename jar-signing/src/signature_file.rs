// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Entry digests and signature files.

Every ordinary archive entry has a manifest section carrying the digest of
its content. A signature file mirrors the manifest: each of its entry
sections carries the digest of the encoded manifest section for the same
entry, and its main section carries digests of the whole manifest and of the
manifest main section. The signature block then signs the signature file.
*/

use {
    crate::{algorithm::DigestAlgorithm, JarSignError},
    jar_manifest::{Manifest, Section, MANIFEST_PATH},
    log::debug,
    std::io::Read,
};

pub const SIGNATURE_VERSION_ATTRIBUTE: &str = "Signature-Version";

pub const CREATED_BY_ATTRIBUTE: &str = "Created-By";

/// Directory holding the manifest and signature metadata.
const METADATA_DIRECTORY: &str = "META-INF/";

/// Extensions of signature metadata entries.
const SIGNATURE_EXTENSIONS: &[&str] = &["SF", "RSA", "DSA", "EC"];

/// Whether an archive path is the manifest.
pub fn is_manifest(path: &str) -> bool {
    path.eq_ignore_ascii_case(MANIFEST_PATH)
}

/// Resolve the signer base name of a signature metadata entry.
///
/// Signature metadata entries are signature files and signature blocks
/// directly under `META-INF/`, e.g. `META-INF/MYKEY.SF`. Returns `None` for
/// any other path. Matching is case-insensitive.
pub fn signature_metadata_base(path: &str) -> Option<&str> {
    let prefix = path.get(..METADATA_DIRECTORY.len())?;
    if !prefix.eq_ignore_ascii_case(METADATA_DIRECTORY) {
        return None;
    }

    let file_name = &path[METADATA_DIRECTORY.len()..];
    if file_name.contains('/') {
        return None;
    }

    let (base, extension) = file_name.rsplit_once('.')?;

    if !base.is_empty()
        && SIGNATURE_EXTENSIONS
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    {
        Some(base)
    } else {
        None
    }
}

/// Whether an archive entry is digested into the manifest.
pub fn is_digested_entry(path: &str) -> bool {
    !(path.ends_with('/') || is_manifest(path) || signature_metadata_base(path).is_some())
}

/// Digest the content of an entry.
pub fn digest_reader(
    algorithm: DigestAlgorithm,
    reader: &mut impl Read,
) -> Result<Vec<u8>, JarSignError> {
    let mut context = algorithm.digester();
    let mut buffer = [0u8; 16384];

    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }

        context.update(&buffer[0..count]);
    }

    Ok(context.finish().as_ref().to_vec())
}

/// Make the manifest section of an entry carry a digest.
///
/// A missing section is created. An existing section is only touched if its
/// digest attribute is missing or differs, so correct sections stay
/// pristine.
///
/// Returns whether the manifest was changed.
pub fn repair_entry_digest(
    manifest: &mut Manifest,
    name: &str,
    algorithm: DigestAlgorithm,
    digest: &[u8],
) -> Result<bool, JarSignError> {
    let attribute = algorithm.digest_attribute();
    let value = base64::encode(digest);

    match manifest.section_mut(name) {
        Some(section) => {
            if section.attribute(&attribute) == Some(value.as_str()) {
                return Ok(false);
            }

            debug!("updating {} of {}", attribute, name);
            section.set_attribute(attribute, value)?;
        }
        None => {
            debug!("adding manifest section for {}", name);
            let mut section = Section::entry(name)?;
            section.set_attribute(attribute, value)?;
            manifest.add_section(section)?;
        }
    }

    Ok(true)
}

/// Generates signature files.
#[derive(Clone, Debug)]
pub struct SignatureFileBuilder {
    digest_algorithm: DigestAlgorithm,
    created_by: String,
}

impl SignatureFileBuilder {
    pub fn new(digest_algorithm: DigestAlgorithm, created_by: impl ToString) -> Self {
        Self {
            digest_algorithm,
            created_by: created_by.to_string(),
        }
    }

    /// Build a signature file over a manifest.
    ///
    /// `names` are the entries to cover. Each must have a manifest section.
    pub fn build<'a>(
        &self,
        manifest: &Manifest,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Manifest, JarSignError> {
        let algorithm = self.digest_algorithm;
        let ring_algorithm = algorithm.ring_algorithm();

        let mut main = Section::main();
        main.set_attribute(SIGNATURE_VERSION_ATTRIBUTE, "1.0")?;
        main.set_attribute(CREATED_BY_ATTRIBUTE, &self.created_by)?;
        main.set_attribute(
            algorithm.manifest_digest_attribute(),
            base64::encode(manifest.digest(ring_algorithm)),
        )?;
        main.set_attribute(
            algorithm.main_attributes_digest_attribute(),
            base64::encode(manifest.main_digest(ring_algorithm)),
        )?;

        let mut signature_file = Manifest::from_main_section(main);

        for name in names {
            let manifest_section = manifest
                .section(name)
                .ok_or_else(|| JarSignError::MissingManifestSection(name.to_string()))?;

            let mut section = Section::entry(name)?;
            section.set_attribute(
                algorithm.digest_attribute(),
                base64::encode(manifest_section.digest(ring_algorithm)),
            )?;

            signature_file.add_section(section)?;
        }

        Ok(signature_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_paths() {
        assert!(is_manifest("META-INF/MANIFEST.MF"));
        assert!(is_manifest("meta-inf/manifest.mf"));
        assert!(!is_manifest("META-INF/MANIFEST.MF/"));

        assert_eq!(signature_metadata_base("META-INF/CERT.SF"), Some("CERT"));
        assert_eq!(signature_metadata_base("META-INF/cert.rsa"), Some("cert"));
        assert_eq!(signature_metadata_base("meta-inf/A.B.Ec"), Some("A.B"));
        assert_eq!(signature_metadata_base("META-INF/KEY.DSA"), Some("KEY"));
        assert_eq!(signature_metadata_base("META-INF/sub/CERT.SF"), None);
        assert_eq!(signature_metadata_base("META-INF/.SF"), None);
        assert_eq!(signature_metadata_base("META-INF/CERT.txt"), None);
        assert_eq!(signature_metadata_base("META-INF/MANIFEST.MF"), None);
        assert_eq!(signature_metadata_base("CERT.SF"), None);
        assert_eq!(signature_metadata_base("META"), None);

        assert!(is_digested_entry("a.txt"));
        assert!(is_digested_entry("META-INF/services/foo"));
        assert!(!is_digested_entry("dir/"));
        assert!(!is_digested_entry("META-INF/CERT.SF"));
        assert!(!is_digested_entry("META-INF/MANIFEST.MF"));
    }

    #[test]
    fn repair_changed_digest() -> Result<(), JarSignError> {
        let mut manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\n\r\nName: a.txt\r\nSHA-256-Digest: X\r\n\r\n",
        )?;
        assert!(!manifest.is_modified());

        let digest = DigestAlgorithm::Sha256.digest(b"content");
        let encoded = base64::encode(&digest);

        assert!(repair_entry_digest(
            &mut manifest,
            "a.txt",
            DigestAlgorithm::Sha256,
            &digest
        )?);

        let section = manifest.section("a.txt").unwrap();
        assert_eq!(section.attribute("SHA-256-Digest"), Some(encoded.as_str()));
        assert!(section.is_modified());
        assert!(!manifest.main_section().is_modified());

        Ok(())
    }

    #[test]
    fn repair_is_idempotent() -> Result<(), JarSignError> {
        let digest = DigestAlgorithm::Sha256.digest(b"content");
        let data = format!(
            "Manifest-Version: 1.0\r\n\r\nName: a.txt\r\nSHA-256-Digest: {}\r\n\r\n",
            base64::encode(&digest)
        );

        let mut manifest = Manifest::parse(data.as_bytes())?;

        for _ in 0..2 {
            assert!(!repair_entry_digest(
                &mut manifest,
                "a.txt",
                DigestAlgorithm::Sha256,
                &digest
            )?);
            assert!(!manifest.is_modified());
        }

        assert_eq!(manifest.to_bytes(), data.as_bytes());

        Ok(())
    }

    #[test]
    fn repair_adds_sections() -> Result<(), JarSignError> {
        let mut manifest = Manifest::parse(b"Manifest-Version: 1.0\r\n\r\n")?;
        let digest = DigestAlgorithm::Sha1.digest(b"content");

        assert!(repair_entry_digest(
            &mut manifest,
            "b/c.class",
            DigestAlgorithm::Sha1,
            &digest
        )?);
        assert!(manifest.is_modified());
        assert_eq!(manifest.len(), 1);

        let expected = format!(
            "Manifest-Version: 1.0\r\n\r\nName: b/c.class\r\nSHA1-Digest: {}\r\n\r\n",
            base64::encode(&digest)
        );
        assert_eq!(manifest.to_bytes(), expected.as_bytes());

        Ok(())
    }

    #[test]
    fn repair_keeps_other_algorithms() -> Result<(), JarSignError> {
        let mut manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\n\r\nName: a.txt\r\nSHA1-Digest: Y\r\n\r\n",
        )?;

        repair_entry_digest(
            &mut manifest,
            "a.txt",
            DigestAlgorithm::Sha256,
            &DigestAlgorithm::Sha256.digest(b""),
        )?;

        let section = manifest.section("a.txt").unwrap();
        assert_eq!(section.attribute("SHA1-Digest"), Some("Y"));
        assert!(section.attribute("SHA-256-Digest").is_some());

        Ok(())
    }

    #[test]
    fn digest_streaming() -> Result<(), JarSignError> {
        let data = vec![42u8; 100_000];

        assert_eq!(
            digest_reader(DigestAlgorithm::Sha384, &mut std::io::Cursor::new(&data))?,
            DigestAlgorithm::Sha384.digest(&data)
        );

        Ok(())
    }

    #[test]
    fn signature_file_digests() -> Result<(), JarSignError> {
        let manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\nCreated-By: test\r\n\r\n\
              Name: a.txt\r\nSHA-256-Digest: AAAA\r\n\r\n\
              Name: b.txt\r\nSHA-256-Digest: BBBB\r\n\r\n",
        )?;

        let builder = SignatureFileBuilder::new(DigestAlgorithm::Sha256, "unit tests");
        let signature_file = builder.build(&manifest, ["b.txt", "a.txt"])?;

        let main = signature_file.main_section();
        assert_eq!(main.attribute("Signature-Version"), Some("1.0"));
        assert_eq!(main.attribute("Created-By"), Some("unit tests"));
        assert_eq!(
            main.attribute("SHA-256-Digest-Manifest"),
            Some(base64::encode(DigestAlgorithm::Sha256.digest(&manifest.to_bytes())).as_str())
        );
        assert_eq!(
            main.attribute("SHA-256-Digest-Manifest-Main-Attributes"),
            Some(
                base64::encode(
                    DigestAlgorithm::Sha256.digest(b"Manifest-Version: 1.0\r\nCreated-By: test\r\n\r\n")
                )
                .as_str()
            )
        );

        let names = signature_file
            .sections()
            .filter_map(|s| s.name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["b.txt", "a.txt"]);

        assert_eq!(
            signature_file.section("a.txt").unwrap().attribute("SHA-256-Digest"),
            Some(
                base64::encode(
                    DigestAlgorithm::Sha256.digest(b"Name: a.txt\r\nSHA-256-Digest: AAAA\r\n\r\n")
                )
                .as_str()
            )
        );

        let encoded = signature_file.to_bytes();
        assert!(encoded.starts_with(b"Signature-Version: 1.0\r\nCreated-By: unit tests\r\n"));
        assert_eq!(Manifest::parse(&encoded)?.to_bytes(), encoded);

        assert!(matches!(
            builder.build(&manifest, ["missing"]),
            Err(JarSignError::MissingManifestSection(_))
        ));

        Ok(())
    }
}
