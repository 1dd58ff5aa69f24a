use nom::number::complete::be_i16;

pub struct Utils;

impl Utils {
    /// Decodes the inverter's 3-byte "formula" payload.
    ///
    /// The bytes arrive as (a, b, c) and are reassembled as `c a b`, shifted
    /// left by 7 and the resulting 32 bits read as an IEEE-754 single. No
    /// scaling is applied.
    pub fn formula_to_f32(bytes: [u8; 3]) -> f32 {
        let [a, b, c] = bytes;
        let raw = ((u32::from(c) << 8 | u32::from(a)) << 8 | u32::from(b)) << 7;
        f32::from_bits(raw)
    }

    /// Like `formula_to_f32` but reads the three bytes from `input` at
    /// `offset`, returning None if the slice is too short.
    pub fn formula_at(input: &[u8], offset: usize) -> Option<f32> {
        let bytes: [u8; 3] = input.get(offset..offset.checked_add(3)?)?.try_into().ok()?;
        Some(Self::formula_to_f32(bytes))
    }

    /// Big-endian two's-complement 16-bit integer at `offset`.
    pub fn be_i16_at(input: &[u8], offset: usize) -> Option<i16> {
        let field = input.get(offset..)?;
        be_i16::<_, nom::error::Error<&[u8]>>(field)
            .ok()
            .map(|(_, value)| value)
    }

    pub fn u16ify_be(array: &[u8], offset: usize) -> Option<u16> {
        let bytes = array.get(offset..offset.checked_add(2)?)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn round(x: f64, decimals: u32) -> f64 {
        let y = 10i32.pow(decimals) as f64;
        (x * y).round() / y
    }
}
