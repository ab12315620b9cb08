//! Magic-byte signatures used to recognise a correct decryption.
//!
//! Only the first AES block of a candidate plaintext is available when a key
//! is validated, so every signature here fits in 16 bytes.

use std::collections::HashMap;
use std::fmt;

use crate::types::BLOCK_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Pdf,
    OleDocument,
    ZipContainer,
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Rar,
    SevenZip,
    Rtf,
    Mp3,
    Psd,
    Sqlite,
    Text,
}

impl FileType {
    pub fn name(&self) -> &'static str {
        match self {
            FileType::Pdf => "PDF Document",
            FileType::OleDocument => "OLE2 Compound Document",
            FileType::ZipContainer => "ZIP Container",
            FileType::Jpeg => "JPEG Image",
            FileType::Png => "PNG Image",
            FileType::Gif => "GIF Image",
            FileType::Bmp => "BMP Image",
            FileType::Tiff => "TIFF Image",
            FileType::Rar => "RAR Archive",
            FileType::SevenZip => "7-Zip Archive",
            FileType::Rtf => "Rich Text",
            FileType::Mp3 => "MP3 Audio",
            FileType::Psd => "Photoshop Image",
            FileType::Sqlite => "SQLite Database",
            FileType::Text => "Plain Text",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct FileSignature {
    file_type: FileType,
    magic: Vec<u8>,
}

impl FileSignature {
    pub fn new(file_type: FileType, magic: Vec<u8>) -> Self {
        debug_assert!(magic.len() <= BLOCK_LEN);
        Self { file_type, magic }
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(&self.magic)
    }
}

/// Extension-aware signature table.
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    signatures: HashMap<FileType, Vec<FileSignature>>,
    extensions: HashMap<String, FileType>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table used by the plaintext validator.
    pub fn default_documents() -> Self {
        let mut registry = Self::new();

        registry.register(FileSignature::new(FileType::Pdf, b"%PDF".to_vec()), &["pdf", "ai"]);
        registry.register(
            FileSignature::new(
                FileType::OleDocument,
                vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
            ),
            &["doc", "xls", "ppt", "msg", "vsd", "pub", "mdb"],
        );
        registry.register(
            FileSignature::new(FileType::ZipContainer, b"PK\x03\x04".to_vec()),
            &[
                "zip", "docx", "xlsx", "pptx", "odt", "ods", "odp", "jar", "apk", "epub",
            ],
        );
        registry.register(FileSignature::new(FileType::Jpeg, vec![0xFF, 0xD8, 0xFF]), &["jpg", "jpeg"]);
        registry.register(
            FileSignature::new(FileType::Png, vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            &["png"],
        );
        registry.register(FileSignature::new(FileType::Gif, b"GIF87a".to_vec()), &["gif"]);
        registry.register(FileSignature::new(FileType::Gif, b"GIF89a".to_vec()), &[]);
        registry.register(FileSignature::new(FileType::Bmp, b"BM".to_vec()), &["bmp"]);
        registry.register(FileSignature::new(FileType::Tiff, b"II*\0".to_vec()), &["tif", "tiff"]);
        registry.register(FileSignature::new(FileType::Tiff, b"MM\0*".to_vec()), &[]);
        registry.register(FileSignature::new(FileType::Rar, b"Rar!\x1A\x07".to_vec()), &["rar"]);
        registry.register(
            FileSignature::new(FileType::SevenZip, vec![0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]),
            &["7z"],
        );
        registry.register(FileSignature::new(FileType::Rtf, b"{\\rtf".to_vec()), &["rtf"]);
        registry.register(FileSignature::new(FileType::Mp3, b"ID3".to_vec()), &["mp3"]);
        registry.register(FileSignature::new(FileType::Psd, b"8BPS".to_vec()), &["psd"]);
        registry.register(
            FileSignature::new(FileType::Sqlite, b"SQLite format 3\0".to_vec()),
            &["sqlite", "db"],
        );

        for ext in [
            "txt", "csv", "xml", "html", "htm", "json", "ini", "log", "md", "c", "h", "py", "js",
            "css", "sql", "bat", "sh", "eml",
        ] {
            registry.extensions.insert(ext.to_string(), FileType::Text);
        }

        registry
    }

    pub fn register(&mut self, signature: FileSignature, extensions: &[&str]) {
        let file_type = signature.file_type();
        for ext in extensions {
            self.extensions.insert(ext.to_ascii_lowercase(), file_type);
        }
        self.signatures.entry(file_type).or_default().push(signature);
    }

    /// The file type an extension promises, if the registry knows it.
    pub fn type_for_extension(&self, extension: &str) -> Option<FileType> {
        self.extensions.get(&extension.to_ascii_lowercase()).copied()
    }

    pub fn get_signatures(&self, file_type: FileType) -> &[FileSignature] {
        self.signatures
            .get(&file_type)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The first binary signature matching `prefix`.
    pub fn identify(&self, prefix: &[u8]) -> Option<FileType> {
        self.signatures
            .values()
            .flatten()
            .find(|sig| sig.matches(prefix))
            .map(|sig| sig.file_type())
    }

    /// Whether `prefix` matches any signature of `file_type`.
    pub fn matches_type(&self, file_type: FileType, prefix: &[u8]) -> bool {
        if file_type == FileType::Text {
            return looks_like_text(prefix);
        }
        self.get_signatures(file_type)
            .iter()
            .any(|sig| sig.matches(prefix))
    }
}

/// Printable ASCII, common whitespace, or a UTF-8/UTF-16 byte-order mark.
pub fn looks_like_text(prefix: &[u8]) -> bool {
    if prefix.is_empty() {
        return false;
    }
    if prefix.starts_with(&[0xEF, 0xBB, 0xBF])
        || prefix.starts_with(&[0xFF, 0xFE])
        || prefix.starts_with(&[0xFE, 0xFF])
    {
        return true;
    }
    prefix
        .iter()
        .all(|&b| b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}
