/// The z-base-32 alphabet used by the `B32 ` SAS type.
const B32_ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

/// Render the leftmost 20 bits of `sas_hash` as four z-base-32 characters.
pub(crate) fn render_b32(sas_hash: &[u8]) -> String {
    let mut top = [0u8; 4];
    let n = sas_hash.len().min(4);
    top[..n].copy_from_slice(&sas_hash[..n]);
    let value = u32::from_be_bytes(top);
    [27, 22, 17, 12].iter().map(|shift| B32_ALPHABET[((value >> shift) & 0x1f) as usize] as char).collect()
}
