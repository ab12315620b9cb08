//! Shared fixture builders for integration tests.

#![allow(dead_code)]

use num_bigint::BigUint;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use teslacrack::cipher;
use teslacrack::{AesKey, CipherHeader, FactorSet, FormatVersion, KeyId, KeyRecord, MemoryKeyStore};

/// Header integer and factors published for a real infection; only the
/// factors are stored, so the engine has to recover the key.
pub const ID_A: &str = "7097DDB2E5DD08950D18C263A41FF5700E7F2A01874B20F402680752268E43F4C5B7B26AF2642AE37BD64AB65B6426711A9DC44EA47FC220814E88009C90EA";
pub const KEY_A: &str = "017b1647d4242bc67ce8a6aaec4d8b493f35519bd82775623d86182167148dd9";
pub const FACTORS_A: [&str; 12] = [
    "2",
    "7",
    "97",
    "131",
    "14983",
    "28099",
    "4030421",
    "123985129",
    "2124553904704757231",
    "2195185826800714519",
    "5573636538860090464486823831839",
    "23677274243760534899430414029178304942110152493113248247",
];

/// Stored with its key already recovered.
pub const ID_B: &str = "07E18921C536C112A14966D4EAAD01F10537F77984ADAAE398048F12685E2870CD1968FE3317319693DA16FFECF6A78EDBC325DDA2EE78A3F9DF8EEFD40299D9";
pub const KEY_B: &str = "1b5c52aafcffda2e71001cf1880fe45cb93dea4c71328df595cb5eb882a3979f";

/// Stored with factors that contain no key-sized subset product.
pub const ID_C: &str = "C0FFEE0001";
pub const KEY_C: &str = "4242424242424242424242424242424242424242424242424242424242424242";

/// Never stored.
pub const ID_D: &str = "D00D0002";
pub const KEY_D: &str = "2424242424242424242424242424242424242424242424242424242424242424";

pub fn pdf(body: &str) -> Vec<u8> {
    format!("%PDF-1.4\n%\u{e2}\u{e3}\n1 0 obj\n<< /Title ({body}) >>\nendobj\n%%EOF\n").into_bytes()
}

pub fn docx() -> Vec<u8> {
    let mut data = b"PK\x03\x04\x14\x00\x06\x00\x08\x00".to_vec();
    data.extend_from_slice(b"[Content_Types].xml and the rest of the archive");
    data
}

pub fn ole_doc() -> Vec<u8> {
    let mut data = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    data.extend((0u8..120).map(|i| i.wrapping_mul(7)));
    data
}

pub fn jpeg() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    data.extend((0u8..200).map(|i| i.wrapping_mul(31)));
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

pub fn png() -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(&[0, 0, 0, 13]);
    data.extend_from_slice(b"IHDR");
    data.extend((0u8..64).map(|i| i ^ 0x5A));
    data
}

pub fn text(body: &str) -> Vec<u8> {
    body.as_bytes().to_vec()
}

/// A complete TeslaCrypt file: header followed by the AES-CBC ciphertext.
pub fn tesla_file(id: &str, key_hex: &str, plain: &[u8]) -> Vec<u8> {
    let key = AesKey::from_hex(key_hex).unwrap();
    let iv = [0x11; 16];
    let header = CipherHeader::new(FormatVersion::Tesla3, KeyId::new(id), iv, plain.len() as u32);
    let mut data = header.to_bytes();
    data.extend(cipher::encrypt(plain, &key, &iv).unwrap());
    data
}

pub fn write(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, data).unwrap();
}

/// Key database matching the fixture tree.
pub fn key_store() -> MemoryKeyStore {
    MemoryKeyStore::from_records([
        KeyRecord::new(KeyId::new(ID_A))
            .with_name("ankostis")
            .with_factors(FactorSet::from_decimal(FACTORS_A).unwrap()),
        KeyRecord::new(KeyId::new(ID_B))
            .with_name("hermanndp")
            .with_key(AesKey::from_hex(KEY_B).unwrap()),
        KeyRecord::new(KeyId::new(ID_C)).with_factors(FactorSet::from_decimal(["3", "5", "7"]).unwrap()),
    ])
}

/// Factors for `ID_D` that lead back to `KEY_D`.
pub fn factors_d() -> FactorSet {
    let key = BigUint::parse_bytes(KEY_D.as_bytes(), 16).unwrap();
    FactorSet::new(vec![key, BigUint::from(3u32)]).unwrap()
}

/// Plaintexts of the files the default run can decrypt, by output path.
pub struct Tree {
    pub root: PathBuf,
    pub expected: BTreeMap<PathBuf, Vec<u8>>,
}

impl Tree {
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Builds the mixed infection tree under `root`.
///
/// Default run over a fresh tree: 13 TeslaCrypt files, 11 with ciphertext,
/// 6 decryptable, 2 with a pre-existing output (one good, one bad), 2 whose
/// key cannot be recovered, 1 with an unknown key, 1 bad header, 1 header
/// without payload, 2 unrelated files with a ransomware extension and 2
/// plain files. Eight readable directories below the root plus one
/// unreadable one.
pub fn build_tree(root: &Path) -> Tree {
    let mut expected = BTreeMap::new();
    let mut add = |relative: &str, id: &str, key: &str, plain: Vec<u8>, decryptable: bool| {
        let encrypted = root.join(relative);
        write(&encrypted, &tesla_file(id, key, &plain));
        if decryptable {
            let output = encrypted.with_extension("");
            expected.insert(output, plain);
        }
    };

    add("a1.pdf.vvv", ID_A, KEY_A, pdf("quarterly report"), true);
    add("sub1/a2.docx.ccc", ID_A, KEY_A, docx(), true);
    add("sub1/b1.doc.zzz", ID_B, KEY_B, ole_doc(), true);
    add("sub2/b2.txt.vvv", ID_B, KEY_B, text("Meeting notes for Tuesday.\n"), true);
    add("sub2/a3.jpg.xyz", ID_A, KEY_A, jpeg(), true);
    add("sub3/b3.png.aaa", ID_B, KEY_B, png(), true);

    let done = pdf("already restored");
    add("sub3/done.pdf.vvv", ID_B, KEY_B, done.clone(), false);
    write(&root.join("sub3/done.pdf"), &done);

    add("sub4/stale.pdf.vvv", ID_B, KEY_B, pdf("restored badly"), false);
    write(&root.join("sub4/stale.pdf"), b"garbage from an interrupted run");

    add("sub4/c1.pdf.vvv", ID_C, KEY_C, pdf("unsolved"), false);
    add("sub5/c2.txt.ccc", ID_C, KEY_C, text("also unsolved"), false);
    add("sub5/d1.pdf.vvv", ID_D, KEY_D, pdf("pending"), false);

    let truncated = tesla_file(ID_B, KEY_B, &pdf("cut short"));
    write(&root.join("sub6/broken.pdf.vvv"), &truncated[..100]);
    write(&root.join("sub6/empty.doc.vvv"), &tesla_file(ID_B, KEY_B, b""));

    write(&root.join("sub7/notes.txt.vvv"), b"plain text that merely looks encrypted");
    write(&root.join("sub7/random.ccc"), b"not really encrypted");

    write(&root.join("README.txt"), b"How to restore your files");
    write(&root.join("sub8/image.png"), &png());

    fs::create_dir_all(root.join("locked")).unwrap();

    Tree {
        root: root.to_path_buf(),
        expected,
    }
}

/// Every readable file under `root` with its content.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            } else if let Ok(data) = fs::read(&path) {
                files.insert(path, data);
            }
        }
    }
    files
}

/// Makes a directory unreadable for the lifetime of the guard.
pub struct LockedDir {
    path: PathBuf,
}

impl LockedDir {
    #[cfg(unix)]
    pub fn lock(path: &Path) -> Self {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o000)).unwrap();
        Self {
            path: path.to_path_buf(),
        }
    }

    #[cfg(not(unix))]
    pub fn lock(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Whether the lock is effective (it is not when running as root).
    pub fn is_effective(&self) -> bool {
        fs::read_dir(&self.path).is_err()
    }
}

impl Drop for LockedDir {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o755));
        }
    }
}
