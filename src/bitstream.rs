//! Little-endian integer packing and the CRC-HQX checksum shared by the
//! device-file reader and the SCP-ECG builder/reader.
//!
//! CRC-HQX is the CRC-CCITT-FALSE variant: polynomial `0x1021`, no input
//! or output reflection, no final XOR. The SCP-ECG standard seeds every
//! computation with `0xFFFF`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc::{Crc, CRC_16_IBM_3740};

/// `CRC_16_IBM_3740` is CRC-CCITT-FALSE: poly 0x1021, init 0xFFFF, no
/// reflection, no xorout — exactly CRC-HQX.
const CRC_HQX: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute CRC-HQX over `bytes`, seeded with `seed` (the standard always
/// uses `0xFFFF`; the seed is exposed for testability against arbitrary
/// vectors).
pub fn crc_hqx(bytes: &[u8], seed: u16) -> u16 {
    let mut digest = CRC_HQX.digest_with_initial(seed);
    digest.update(bytes);
    digest.finalize()
}

/// Append a little-endian `u8`.
pub fn push_u8(buf: &mut Vec<u8>, val: u8) {
    buf.write_u8(val).expect("Vec<u8> writes are infallible");
}

/// Append a little-endian `i8`.
pub fn push_i8(buf: &mut Vec<u8>, val: i8) {
    buf.write_i8(val).expect("Vec<u8> writes are infallible");
}

/// Append a little-endian `u16`.
pub fn push_u16(buf: &mut Vec<u8>, val: u16) {
    buf.write_u16::<LittleEndian>(val)
        .expect("Vec<u8> writes are infallible");
}

/// Append a little-endian `u32`.
pub fn push_u32(buf: &mut Vec<u8>, val: u32) {
    buf.write_u32::<LittleEndian>(val)
        .expect("Vec<u8> writes are infallible");
}

/// Append a little-endian `i16`.
pub fn push_i16(buf: &mut Vec<u8>, val: i16) {
    buf.write_i16::<LittleEndian>(val)
        .expect("Vec<u8> writes are infallible");
}

/// Read a little-endian `u16` from a byte slice.
pub fn read_u16(mut bytes: &[u8]) -> std::io::Result<u16> {
    bytes.read_u16::<LittleEndian>()
}

/// Read a little-endian `u32` from a byte slice.
pub fn read_u32(mut bytes: &[u8]) -> std::io::Result<u32> {
    bytes.read_u32::<LittleEndian>()
}
