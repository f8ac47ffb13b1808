//! Memory-mapped safetensors files.
//!
//! Format: an 8-byte little-endian header length, a JSON header,
//! then the raw tensor data. Only the header is decoded; the data
//! stays mapped until the value is dropped, which unmaps it.
//! See <https://github.com/huggingface/safetensors>.

use std::fs::File;
use std::io;
use std::path::Path;

use log::debug;
use memmap2::Mmap;

use crate::json::{self, Value};

pub struct Safetensors {
    mem: Mmap,
    header: Value,
    data_offset: usize,
}

impl Safetensors {
    pub fn load_file(path: &Path) -> io::Result<Safetensors> {
        let file = File::open(path)?;
        let mem = unsafe { Mmap::map(&file)? };
        if mem.len() < 8 {
            return Err(io::Error::other("truncated safetensors file"));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&mem[..8]);
        let header_size = u64::from_le_bytes(len_bytes) as usize;
        debug!("header size: {header_size}");

        let data_offset = 8usize
            .checked_add(header_size)
            .filter(|&end| end <= mem.len())
            .ok_or_else(|| io::Error::other("safetensors header out of bounds"))?;
        let mut header_bytes = &mem[8..data_offset];
        let header = json::parse_stream(&mut header_bytes, header_size).map_err(io::Error::other)?;
        debug!("header: {header}");

        Ok(Safetensors {
            mem,
            header,
            data_offset,
        })
    }

    pub fn header(&self) -> &Value {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.mem[self.data_offset..]
    }
}
