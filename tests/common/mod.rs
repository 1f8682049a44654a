//! Minimal ZIP writer for building test archives byte by byte.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

#[derive(Debug, Clone)]
pub struct FixtureEntry {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    /// Method written to both headers
    pub method: u16,
    /// Compress `data` with DEFLATE
    pub deflate: bool,
    pub crc_override: Option<u32>,
    pub uncompressed_size_override: Option<u32>,
    /// Zero local sizes/CRC, set flag bit 3, append a descriptor
    pub data_descriptor: bool,
    pub local_method_override: Option<u16>,
    pub flags: u16,
}

impl FixtureEntry {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
            method: 0,
            deflate: false,
            crc_override: None,
            uncompressed_size_override: None,
            data_descriptor: false,
            local_method_override: None,
            flags: 0,
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            method: 8,
            deflate: true,
            ..Self::stored(name, data)
        }
    }

    pub fn directory(name: &str) -> Self {
        assert!(name.ends_with('/'));
        Self::stored(name, b"")
    }

    pub fn with_crc(mut self, crc: u32) -> Self {
        self.crc_override = Some(crc);
        self
    }

    pub fn with_method(mut self, method: u16) -> Self {
        self.method = method;
        self
    }

    pub fn with_local_method(mut self, method: u16) -> Self {
        self.local_method_override = Some(method);
        self
    }

    pub fn with_uncompressed_size(mut self, size: u32) -> Self {
        self.uncompressed_size_override = Some(size);
        self
    }

    pub fn with_data_descriptor(mut self) -> Self {
        self.data_descriptor = true;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }
}

#[derive(Debug, Default)]
pub struct ZipBuilder {
    entries: Vec<FixtureEntry>,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: FixtureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(FixtureEntry::stored(name, data))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(FixtureEntry::deflated(name, data))
    }

    pub fn directory(self, name: &str) -> Self {
        self.entry(FixtureEntry::directory(name))
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for entry in &self.entries {
            let payload = if entry.deflate {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                enc.write_all(&entry.data).unwrap();
                enc.finish().unwrap()
            } else {
                entry.data.clone()
            };
            let crc = entry
                .crc_override
                .unwrap_or_else(|| crc32fast::hash(&entry.data));
            let compressed = payload.len() as u32;
            let uncompressed = entry
                .uncompressed_size_override
                .unwrap_or(entry.data.len() as u32);
            let flags = entry.flags | if entry.data_descriptor { 1 << 3 } else { 0 };
            let offset = out.len() as u32;

            let (local_crc, local_csize, local_usize) = if entry.data_descriptor {
                (0, 0, 0)
            } else {
                (crc, compressed, uncompressed)
            };

            out.extend_from_slice(b"PK\x03\x04");
            put_u16(&mut out, 20);
            put_u16(&mut out, flags);
            put_u16(&mut out, entry.local_method_override.unwrap_or(entry.method));
            put_u16(&mut out, 0);
            put_u16(&mut out, 0x21);
            put_u32(&mut out, local_crc);
            put_u32(&mut out, local_csize);
            put_u32(&mut out, local_usize);
            put_u16(&mut out, entry.name.len() as u16);
            put_u16(&mut out, 0);
            out.extend_from_slice(&entry.name);
            out.extend_from_slice(&payload);

            if entry.data_descriptor {
                out.extend_from_slice(b"PK\x07\x08");
                put_u32(&mut out, crc);
                put_u32(&mut out, compressed);
                put_u32(&mut out, uncompressed);
            }

            central.extend_from_slice(b"PK\x01\x02");
            put_u16(&mut central, 20);
            put_u16(&mut central, 20);
            put_u16(&mut central, flags);
            put_u16(&mut central, entry.method);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0x21);
            put_u32(&mut central, crc);
            put_u32(&mut central, compressed);
            put_u32(&mut central, uncompressed);
            put_u16(&mut central, entry.name.len() as u16);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u32(&mut central, 0);
            put_u32(&mut central, offset);
            central.extend_from_slice(&entry.name);
        }

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);

        out.extend_from_slice(b"PK\x05\x06");
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, self.entries.len() as u16);
        put_u16(&mut out, self.entries.len() as u16);
        put_u32(&mut out, central.len() as u32);
        put_u32(&mut out, cd_offset);
        put_u16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Every file under `root`, as (relative path with `/`, contents), sorted.
pub fn snapshot(root: &std::path::Path) -> Vec<(String, Option<Vec<u8>>)> {
    fn walk(root: &std::path::Path, dir: &std::path::Path, out: &mut Vec<(String, Option<Vec<u8>>)>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            if path.is_dir() {
                out.push((format!("{rel}/"), None));
                walk(root, &path, out);
            } else {
                out.push((rel, Some(std::fs::read(&path).unwrap())));
            }
        }
    }

    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
