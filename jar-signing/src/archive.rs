// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing of Java archives.

[JarSigner] rewrites an archive into a signed copy. The source archive is
only read. Output entries appear in this order:

1. `META-INF/MANIFEST.MF`, with digests of every ordinary entry.
2. The signature file and signature block of the signer.
3. Signature entries of other signers, if they remain valid.
4. All other entries, copied without recompression.
*/

use {
    crate::{
        settings::{JarSigningSettings, SignerName},
        signature_file::{
            digest_reader, is_digested_entry, is_manifest, repair_entry_digest,
            signature_metadata_base, SignatureFileBuilder, CREATED_BY_ATTRIBUTE,
        },
        signing::SignatureBlockBuilder,
        JarSignError,
    },
    jar_manifest::{Manifest, MANIFEST_PATH},
    log::{debug, info, warn},
    std::{
        collections::HashSet,
        fs::{File, OpenOptions},
        io::{BufReader, Read, Seek, Write},
        path::Path,
    },
    zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter},
};

/// How an archive entry takes part in signing.
#[derive(Clone, Debug, Eq, PartialEq)]
enum EntryKind {
    Manifest,
    /// A signature file or block, with its signer base name.
    SignatureMetadata(String),
    Ordinary,
}

impl EntryKind {
    fn classify(path: &str) -> Self {
        if is_manifest(path) {
            Self::Manifest
        } else if let Some(base) = signature_metadata_base(path) {
            Self::SignatureMetadata(base.to_string())
        } else {
            Self::Ordinary
        }
    }
}

/// Summary of a signing operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SigningReport {
    pub signer_name: SignerName,
    /// Number of entries whose digests were computed.
    pub entries_digested: usize,
    /// Whether the manifest had to be changed.
    pub manifest_modified: bool,
    /// Signature entries of other signers carried forward.
    pub retained_signatures: usize,
    /// Signature entries dropped because the manifest changed.
    pub discarded_signatures: usize,
    pub time_stamped: bool,
}

/// Signs Java archives.
pub struct JarSigner {
    settings: JarSigningSettings,
}

impl JarSigner {
    pub fn new(settings: JarSigningSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &JarSigningSettings {
        &self.settings
    }

    /// Sign an archive, writing the signed archive to a new file.
    ///
    /// The destination must not exist. It is removed again if signing fails.
    pub fn sign(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<SigningReport, JarSignError> {
        let source = source.as_ref();
        let destination = destination.as_ref();

        info!("signing {} to {}", source.display(), destination.display());

        let reader = BufReader::new(File::open(source)?);

        let mut fh = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    JarSignError::DestinationExists(destination.to_path_buf())
                } else {
                    JarSignError::Io(e)
                }
            })?;

        match self.sign_archive(reader, &mut fh) {
            Ok(report) => Ok(report),
            Err(e) => {
                drop(fh);
                if let Err(remove_error) = std::fs::remove_file(destination) {
                    warn!(
                        "unable to remove partial output {}: {}",
                        destination.display(),
                        remove_error
                    );
                }

                Err(e)
            }
        }
    }

    /// Sign an archive, replacing it with the signed archive.
    ///
    /// The signed archive is written to a temporary file next to the source,
    /// which only replaces the source once signing succeeded.
    pub fn sign_in_place(&self, path: impl AsRef<Path>) -> Result<SigningReport, JarSignError> {
        let path = path.as_ref();

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        info!("signing {} in place", path.display());

        let mut temp = tempfile::NamedTempFile::new_in(directory)?;

        let report = {
            let reader = BufReader::new(File::open(path)?);
            self.sign_archive(reader, temp.as_file_mut())?
        };

        temp.persist(path).map_err(|e| JarSignError::Io(e.error))?;

        Ok(report)
    }

    /// Sign archive data read from a reader, writing the signed archive to a writer.
    pub fn sign_archive(
        &self,
        source: impl Read + Seek,
        destination: impl Write + Seek,
    ) -> Result<SigningReport, JarSignError> {
        let identity = self.settings.identity();
        let signer_name = identity.signer_name();
        let digest_algorithm = self.settings.digest_algorithm();

        let mut archive = ZipArchive::new(source)?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut names = HashSet::new();
        for index in 0..archive.len() {
            let name = archive.by_index_raw(index)?.name().to_string();

            // Only the first of several same-named entries is signed and kept.
            if !names.insert(name.clone()) {
                warn!("ignoring duplicate archive entry {}", name);
                continue;
            }

            let kind = EntryKind::classify(&name);
            entries.push((index, name, kind));
        }

        let mut manifest = self.read_manifest(&mut archive, &entries)?;

        let mut digested = vec![];

        for (index, name, kind) in &entries {
            if kind != &EntryKind::Ordinary || !is_digested_entry(name) {
                continue;
            }

            let digest = digest_reader(digest_algorithm, &mut archive.by_index(*index)?)?;

            if repair_entry_digest(&mut manifest, name, digest_algorithm, &digest)? {
                debug!("manifest digest of {} updated", name);
            }

            digested.push(name.as_str());
        }

        let manifest_modified = manifest.is_modified();
        let manifest_data = manifest.to_bytes();

        info!(
            "digested {} entries with {}; manifest {}",
            digested.len(),
            digest_algorithm,
            if manifest_modified {
                "modified"
            } else {
                "unchanged"
            }
        );

        let signature_file =
            SignatureFileBuilder::new(digest_algorithm, self.settings.created_by())
                .build(&manifest, digested.iter().copied())?;
        let signature_file_data = signature_file.to_bytes();

        let mut block_builder = SignatureBlockBuilder::new(identity.key(), identity.chain());
        if let Some(oid) = self.settings.signature_algorithm() {
            block_builder = block_builder.signature_algorithm(oid.clone());
        }
        if let Some(client) = self.settings.time_stamp_client() {
            block_builder = block_builder.time_stamp_client(client);
        }

        let block = block_builder.build(&signature_file_data)?;

        let mut writer = ZipWriter::new(destination);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.start_file(MANIFEST_PATH, options)?;
        writer.write_all(&manifest_data)?;

        writer.start_file(format!("META-INF/{}.SF", signer_name), options)?;
        writer.write_all(&signature_file_data)?;

        writer.start_file(block.entry_name(signer_name), options)?;
        writer.write_all(block.data())?;

        let mut retained_signatures = 0;
        let mut discarded_signatures = 0;

        for (index, name, kind) in &entries {
            if let EntryKind::SignatureMetadata(base) = kind {
                if manifest_modified {
                    discarded_signatures += 1;
                } else if signer_name.matches(base) {
                    debug!("superseding {}", name);
                } else {
                    debug!("retaining {}", name);
                    writer.raw_copy_file(archive.by_index_raw(*index)?)?;
                    retained_signatures += 1;
                }
            }
        }

        if discarded_signatures > 0 {
            warn!(
                "manifest changed; discarded {} existing signature entries",
                discarded_signatures
            );
        }

        let mut seen_manifest = false;

        for (index, name, kind) in &entries {
            match kind {
                EntryKind::Ordinary => {
                    writer.raw_copy_file(archive.by_index_raw(*index)?)?;
                }
                EntryKind::Manifest if seen_manifest => {
                    warn!("ignoring duplicate manifest entry {}", name);
                }
                EntryKind::Manifest => {
                    seen_manifest = true;
                }
                EntryKind::SignatureMetadata(_) => {}
            }
        }

        writer.finish()?;

        Ok(SigningReport {
            signer_name: signer_name.clone(),
            entries_digested: digested.len(),
            manifest_modified,
            retained_signatures,
            discarded_signatures,
            time_stamped: block.time_stamp_token().is_some(),
        })
    }

    /// Read the manifest of an archive, creating one if there is none.
    fn read_manifest<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        entries: &[(usize, String, EntryKind)],
    ) -> Result<Manifest, JarSignError> {
        let index = entries
            .iter()
            .find(|(_, _, kind)| kind == &EntryKind::Manifest)
            .map(|(index, _, _)| *index);

        if let Some(index) = index {
            let mut data = vec![];
            archive.by_index(index)?.read_to_end(&mut data)?;

            let manifest = if self.settings.lenient() {
                Manifest::parse_lenient(&data)?
            } else {
                Manifest::parse(&data)?
            };

            if !manifest.main_section().attributes().is_empty() {
                return Ok(manifest);
            }

            warn!("manifest has no main attributes; replacing it");
        } else {
            info!("archive has no manifest; creating one");
        }

        let mut manifest = Manifest::new();
        manifest
            .main_section_mut()
            .set_attribute(CREATED_BY_ATTRIBUTE, self.settings.created_by())?;

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            asn1::rfc5652::ContentInfo,
            settings::SigningIdentity,
            testutil::*,
            time_stamp_protocol::TimeStampClient,
            DigestAlgorithm,
        },
        std::io::Cursor,
    };

    fn settings(signer: &str) -> JarSigningSettings {
        let identity = SigningIdentity::new(
            Box::new(rsa_private_key()),
            vec![rsa_certificate()],
            SignerName::new(signer).unwrap(),
        );

        let mut settings = JarSigningSettings::new(identity);
        settings.set_created_by("unit tests");

        settings
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::<u8>::new()));

        for (name, data) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, FileOptions::default())
                    .unwrap();
            } else {
                writer
                    .start_file(
                        *name,
                        FileOptions::default().compression_method(CompressionMethod::Stored),
                    )
                    .unwrap();
                writer.write_all(data).unwrap();
            }
        }

        writer.finish().unwrap().into_inner()
    }

    fn read_zip(data: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();

        (0..archive.len())
            .map(|index| {
                let mut file = archive.by_index(index).unwrap();
                let mut content = vec![];
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    fn entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> &'a [u8] {
        &entries.iter().find(|(n, _)| n == name).unwrap().1
    }

    fn names(entries: &[(String, Vec<u8>)]) -> Vec<&str> {
        entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn sign(signer: &JarSigner, source: &[u8]) -> Result<(Vec<u8>, SigningReport), JarSignError> {
        let mut dest = Cursor::new(Vec::<u8>::new());
        let report = signer.sign_archive(Cursor::new(source), &mut dest)?;

        Ok((dest.into_inner(), report))
    }

    #[test]
    fn sign_without_manifest() -> Result<(), JarSignError> {
        let source = build_zip(&[
            ("a.txt", b"hello"),
            ("dir/", b""),
            ("dir/b.txt", b"world"),
        ]);

        let signer = JarSigner::new(settings("unit"));
        let (signed, report) = sign(&signer, &source)?;

        assert_eq!(report.signer_name.as_str(), "UNIT");
        assert_eq!(report.entries_digested, 2);
        assert!(report.manifest_modified);
        assert_eq!(report.retained_signatures, 0);
        assert_eq!(report.discarded_signatures, 0);
        assert!(!report.time_stamped);

        let entries = read_zip(&signed);
        assert_eq!(
            names(&entries),
            vec![
                "META-INF/MANIFEST.MF",
                "META-INF/UNIT.SF",
                "META-INF/UNIT.RSA",
                "a.txt",
                "dir/",
                "dir/b.txt"
            ]
        );

        let manifest_data = entry(&entries, "META-INF/MANIFEST.MF");
        let manifest = Manifest::parse(manifest_data)?;
        assert_eq!(
            manifest.main_section().attribute("Manifest-Version"),
            Some("1.0")
        );
        assert_eq!(
            manifest.main_section().attribute("Created-By"),
            Some("unit tests")
        );
        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.section("a.txt").unwrap().attribute("SHA-256-Digest"),
            Some(base64::encode(DigestAlgorithm::Sha256.digest(b"hello")).as_str())
        );
        assert!(manifest.section("dir/").is_none());

        let signature_file_data = entry(&entries, "META-INF/UNIT.SF");
        let signature_file = Manifest::parse(signature_file_data)?;
        assert_eq!(
            signature_file
                .main_section()
                .attribute("SHA-256-Digest-Manifest"),
            Some(base64::encode(DigestAlgorithm::Sha256.digest(manifest_data)).as_str())
        );
        assert_eq!(signature_file.len(), 2);

        let signed_data = ContentInfo::from_ber(entry(&entries, "META-INF/UNIT.RSA"))?.signed_data()?;
        assert!(verify_rsa_sha256(
            signature_file_data,
            &signed_data.signer_infos[0].signature.to_bytes()
        ));

        Ok(())
    }

    #[test]
    fn raw_copy_preserves_entries() -> Result<(), JarSignError> {
        let source = build_zip(&[("a.txt", b"hello")]);

        let signer = JarSigner::new(settings("unit"));
        let (signed, _) = sign(&signer, &source)?;

        let mut archive = ZipArchive::new(Cursor::new(signed))?;
        let file = archive.by_name("a.txt")?;
        assert_eq!(file.compression(), CompressionMethod::Stored);
        assert_eq!(file.size(), 5);

        Ok(())
    }

    #[test]
    fn retains_other_signers() -> Result<(), JarSignError> {
        let source = build_zip(&[("a.txt", b"hello"), ("b.txt", b"world")]);

        let (first, _) = sign(&JarSigner::new(settings("other")), &source)?;

        let (second, report) = sign(&JarSigner::new(settings("unit")), &first)?;
        assert!(!report.manifest_modified);
        assert_eq!(report.retained_signatures, 2);
        assert_eq!(report.discarded_signatures, 0);

        let entries = read_zip(&second);
        assert_eq!(
            names(&entries),
            vec![
                "META-INF/MANIFEST.MF",
                "META-INF/UNIT.SF",
                "META-INF/UNIT.RSA",
                "META-INF/OTHER.SF",
                "META-INF/OTHER.RSA",
                "a.txt",
                "b.txt"
            ]
        );
        assert_eq!(
            entry(&entries, "META-INF/MANIFEST.MF"),
            entry(&read_zip(&first), "META-INF/MANIFEST.MF")
        );

        // Signing again under an existing name supersedes that signer's entries.
        let (third, report) = sign(&JarSigner::new(settings("other")), &second)?;
        assert!(!report.manifest_modified);
        assert_eq!(report.retained_signatures, 2);

        assert_eq!(
            names(&read_zip(&third)),
            vec![
                "META-INF/MANIFEST.MF",
                "META-INF/OTHER.SF",
                "META-INF/OTHER.RSA",
                "META-INF/UNIT.SF",
                "META-INF/UNIT.RSA",
                "a.txt",
                "b.txt"
            ]
        );

        Ok(())
    }

    #[test]
    fn modified_manifest_discards_signatures() -> Result<(), JarSignError> {
        let source = build_zip(&[("a.txt", b"hello")]);
        let (first, _) = sign(&JarSigner::new(settings("other")), &source)?;

        let entries = read_zip(&first);
        let tampered = build_zip(
            &entries
                .iter()
                .map(|(name, data)| {
                    if name == "a.txt" {
                        (name.as_str(), b"changed".as_ref())
                    } else {
                        (name.as_str(), data.as_slice())
                    }
                })
                .collect::<Vec<_>>(),
        );

        let (second, report) = sign(&JarSigner::new(settings("unit")), &tampered)?;
        assert!(report.manifest_modified);
        assert_eq!(report.retained_signatures, 0);
        assert_eq!(report.discarded_signatures, 2);

        assert_eq!(
            names(&read_zip(&second)),
            vec![
                "META-INF/MANIFEST.MF",
                "META-INF/UNIT.SF",
                "META-INF/UNIT.RSA",
                "a.txt"
            ]
        );

        Ok(())
    }

    #[test]
    fn pristine_manifest_preserved() -> Result<(), JarSignError> {
        let manifest = format!(
            "Manifest-Version: 1.0\nMain-Class: com.example.Main\n\nName: a.txt\nSHA-256-Digest: {}\n\n",
            base64::encode(DigestAlgorithm::Sha256.digest(b"hello"))
        );
        let source = build_zip(&[
            ("META-INF/MANIFEST.MF", manifest.as_bytes()),
            ("a.txt", b"hello"),
        ]);

        let (signed, report) = sign(&JarSigner::new(settings("unit")), &source)?;
        assert!(!report.manifest_modified);
        assert_eq!(
            entry(&read_zip(&signed), "META-INF/MANIFEST.MF"),
            manifest.as_bytes()
        );

        Ok(())
    }

    #[test]
    fn corrupt_manifest() -> Result<(), JarSignError> {
        let source = build_zip(&[
            (
                "META-INF/MANIFEST.MF",
                b"Manifest-Version: 1.0\r\n\r\nName: a.txt\r\nbroken\r\n\r\n",
            ),
            ("a.txt", b"hello"),
        ]);

        assert!(matches!(
            sign(&JarSigner::new(settings("unit")), &source),
            Err(JarSignError::Manifest(_))
        ));

        let mut lenient = settings("unit");
        lenient.set_lenient(true);
        let (signed, report) = sign(&JarSigner::new(lenient), &source)?;
        assert!(report.manifest_modified);

        let manifest = Manifest::parse(entry(&read_zip(&signed), "META-INF/MANIFEST.MF"))?;
        assert!(manifest.section("a.txt").is_some());

        Ok(())
    }

    #[test]
    fn time_stamped() -> Result<(), JarSignError> {
        let source = build_zip(&[("a.txt", b"hello")]);

        let mut settings = settings("unit");
        settings.set_time_stamp_client(TimeStampClient::new(MockTsa::default()));

        let (_, report) = sign(&JarSigner::new(settings), &source)?;
        assert!(report.time_stamped);

        Ok(())
    }

    #[test]
    fn files() -> Result<(), JarSignError> {
        let temp_dir = tempfile::tempdir()?;
        let source_path = temp_dir.path().join("app.jar");
        let dest_path = temp_dir.path().join("signed.jar");

        let source = build_zip(&[("a.txt", b"hello")]);
        std::fs::write(&source_path, &source)?;

        let signer = JarSigner::new(settings("unit"));
        signer.sign(&source_path, &dest_path)?;

        assert_eq!(std::fs::read(&source_path)?, source);
        assert!(names(&read_zip(&std::fs::read(&dest_path)?)).contains(&"META-INF/UNIT.RSA"));

        assert!(matches!(
            signer.sign(&source_path, &dest_path),
            Err(JarSignError::DestinationExists(_))
        ));

        signer.sign_in_place(&source_path)?;
        assert_eq!(
            names(&read_zip(&std::fs::read(&source_path)?)),
            vec![
                "META-INF/MANIFEST.MF",
                "META-INF/UNIT.SF",
                "META-INF/UNIT.RSA",
                "a.txt"
            ]
        );
        assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 2);

        Ok(())
    }

    #[test]
    fn failure_removes_destination() -> Result<(), JarSignError> {
        let temp_dir = tempfile::tempdir()?;
        let source_path = temp_dir.path().join("app.jar");
        let dest_path = temp_dir.path().join("signed.jar");

        std::fs::write(&source_path, build_zip(&[("a.txt", b"hello")]))?;

        let mut settings = settings("unit");
        settings.set_time_stamp_client(TimeStampClient::new(MockTsa {
            tamper: Tamper::Nonce,
            ..Default::default()
        }));

        assert!(matches!(
            JarSigner::new(settings).sign(&source_path, &dest_path),
            Err(JarSignError::TimeStamp(_))
        ));
        assert!(!dest_path.exists());

        Ok(())
    }

    #[test]
    fn empty_manifest_replaced() -> Result<(), JarSignError> {
        for data in [&b""[..], b"\r\n\r\nName: stale\r\n\r\n"] {
            let source = build_zip(&[("META-INF/MANIFEST.MF", data), ("a.txt", b"hello")]);

            let (signed, report) = sign(&JarSigner::new(settings("unit")), &source)?;
            assert!(report.manifest_modified);
            assert_eq!(report.entries_digested, 1);

            let entries = read_zip(&signed);
            let manifest = Manifest::parse(entry(&entries, "META-INF/MANIFEST.MF"))?;
            assert_eq!(
                manifest.main_section().attribute("Manifest-Version"),
                Some("1.0")
            );
            assert_eq!(
                manifest.main_section().attribute("Created-By"),
                Some("unit tests")
            );
            assert_eq!(manifest.len(), 1);
            assert!(manifest.section("a.txt").is_some());
            assert!(manifest.section("stale").is_none());
        }

        Ok(())
    }

    #[test]
    fn unterminated_manifest_digests() -> Result<(), JarSignError> {
        let source = build_zip(&[
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n"),
            ("a.txt", b"hello"),
        ]);

        let (signed, _) = sign(&JarSigner::new(settings("unit")), &source)?;
        let entries = read_zip(&signed);

        let manifest_data = entry(&entries, "META-INF/MANIFEST.MF");
        assert!(manifest_data.starts_with(b"Manifest-Version: 1.0\r\n\r\nName: a.txt\r\n"));

        let signature_file = Manifest::parse(entry(&entries, "META-INF/UNIT.SF"))?;
        assert_eq!(
            signature_file
                .main_section()
                .attribute("SHA-256-Digest-Manifest-Main-Attributes"),
            Some(
                base64::encode(DigestAlgorithm::Sha256.digest(b"Manifest-Version: 1.0\r\n\r\n"))
                    .as_str()
            )
        );

        let section_data = &manifest_data[b"Manifest-Version: 1.0\r\n\r\n".len()..];
        assert_eq!(
            signature_file
                .section("a.txt")
                .unwrap()
                .attribute("SHA-256-Digest"),
            Some(base64::encode(DigestAlgorithm::Sha256.digest(section_data)).as_str())
        );

        Ok(())
    }

    #[test]
    fn duplicate_entries_skipped() -> Result<(), JarSignError> {
        // Rename the second entry in local and central headers to collide with the first.
        let mut source = build_zip(&[("dup-a.txt", b"first"), ("dup-b.txt", b"second")]);
        let mut offset = 0;
        while let Some(position) = source[offset..]
            .windows(9)
            .position(|window| window == b"dup-b.txt")
        {
            source[offset + position + 4] = b'a';
            offset += position + 9;
        }

        let (signed, report) = sign(&JarSigner::new(settings("unit")), &source)?;
        assert_eq!(report.entries_digested, 1);

        let entries = read_zip(&signed);
        assert_eq!(
            names(&entries),
            vec![
                "META-INF/MANIFEST.MF",
                "META-INF/UNIT.SF",
                "META-INF/UNIT.RSA",
                "dup-a.txt"
            ]
        );
        assert_eq!(entry(&entries, "dup-a.txt"), b"first");

        let manifest = Manifest::parse(entry(&entries, "META-INF/MANIFEST.MF"))?;
        assert_eq!(
            manifest.section("dup-a.txt").unwrap().attribute("SHA-256-Digest"),
            Some(base64::encode(DigestAlgorithm::Sha256.digest(b"first")).as_str())
        );

        Ok(())
    }

    #[test]
    fn signer_is_sync() {
        fn assert_sync<T: Sync>() {}

        assert_sync::<JarSigner>();
    }
}
