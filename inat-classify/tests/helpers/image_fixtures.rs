//! Image Test Fixture Writers
//!
//! Minimal files carrying valid magic bytes; content past the header is
//! never decoded.

use std::path::{Path, PathBuf};

const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// JPEG header followed by filler bytes
pub fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let mut bytes = JPEG_HEADER.to_vec();
    bytes.extend_from_slice(&[0u8; 32]);
    write(dir, name, &bytes)
}

pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let mut bytes = PNG_HEADER.to_vec();
    bytes.extend_from_slice(&[0u8; 32]);
    write(dir, name, &bytes)
}

/// Image extension, non-image content
pub fn write_corrupt(dir: &Path, name: &str) -> PathBuf {
    write(dir, name, b"this is not an image")
}

pub fn write_text(dir: &Path, name: &str) -> PathBuf {
    write(dir, name, b"field notes")
}
