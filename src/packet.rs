//! Text-to-packet framing.
//!
//! Subtitle text is carried as single-byte character codes. A [`Packet`]
//! holds exactly one grid's worth of codes, null-padded on the right, and
//! serializes to a [`BitSequence`] of eight bits per code, most significant
//! bit first. The reverse direction, [`bits_to_text`], stops at the first
//! zero byte.
//!
//! # Example
//!
//! ```
//! use subgrid::{GridSpec, PacketEncoder, bits_to_text};
//!
//! let encoder = PacketEncoder::new(GridSpec::default(), 4);
//! let packet = encoder.pack("HI");
//! assert_eq!(&packet.codes()[..3], &[72, 73, 0]);
//!
//! let bits = encoder.packet_to_bits(&packet);
//! assert_eq!(bits_to_text(bits.as_bits()), "HI");
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::configuration::SignalOptions;
use crate::error::SubgridError;
use crate::grid::{BitMatrix, GridSpec};

/// Code substituted for characters outside the single-byte range.
pub const FALLBACK_CODE: u8 = b'?';

/// Map text to single-byte character codes.
///
/// Characters whose code point is above 255 become [`FALLBACK_CODE`].
pub fn text_to_codes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|character| u8::try_from(u32::from(character)).unwrap_or(FALLBACK_CODE))
        .collect()
}

/// Reassemble text from a flat bit slice.
///
/// Bits are grouped into bytes MSB-first. Reconstruction stops at the first
/// zero byte; that byte, everything after it, and any trailing partial byte
/// are dropped. Each byte maps to the character with the same code point.
pub fn bits_to_text(bits: &[bool]) -> String {
    let mut text = String::new();
    for chunk in bits.chunks_exact(8) {
        let code = chunk
            .iter()
            .fold(0u8, |byte, &bit| (byte << 1) | u8::from(bit));
        if code == 0 {
            break;
        }
        text.push(char::from(code));
    }
    text
}

/// One grid's worth of character codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    codes: Vec<u8>,
}

impl Packet {
    /// The padded character codes. Length always equals the grid capacity.
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// The text carried by this packet, up to the first null code.
    pub fn text(&self) -> String {
        self.codes
            .iter()
            .take_while(|&&code| code != 0)
            .map(|&code| char::from(code))
            .collect()
    }
}

/// A packet serialized to bits, MSB-first per character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSequence {
    bits: Vec<bool>,
}

impl BitSequence {
    /// The bits in transmission order.
    pub fn as_bits(&self) -> &[bool] {
        &self.bits
    }

    /// Number of bits (always the grid's bit capacity).
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// `true` for a zero-length sequence.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Reshape into a row-major [`BitMatrix`].
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::BitLengthMismatch`] if the sequence was built
    /// for a grid of a different capacity.
    pub fn to_matrix(&self, grid: GridSpec) -> Result<BitMatrix, SubgridError> {
        BitMatrix::from_bits(grid, &self.bits)
    }
}

impl Display for BitSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for &bit in &self.bits {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// The repetition-expanded packets for one subtitle.
///
/// Each distinct packet appears `repetition` times in a row, so the
/// sequence length is `distinct_packets * repetition`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketSequence {
    packets: Vec<Packet>,
    distinct: usize,
}

impl PacketSequence {
    /// Number of frames needed to transmit the whole sequence once.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// `true` if there is nothing to transmit.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Number of distinct packets before repetition.
    pub fn distinct_packets(&self) -> usize {
        self.distinct
    }

    /// The packet at `cursor`, if any.
    pub fn get(&self, cursor: usize) -> Option<&Packet> {
        self.packets.get(cursor)
    }

    /// Iterate over the packets in transmission order.
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }
}

/// Splits text into packets and packets into bits for one grid shape.
#[derive(Debug, Clone)]
pub struct PacketEncoder {
    grid: GridSpec,
    repetition: usize,
}

impl PacketEncoder {
    /// Create an encoder for `grid` repeating each packet `repetition` times.
    ///
    /// A repetition of zero is clamped to one.
    pub fn new(grid: GridSpec, repetition: usize) -> Self {
        Self {
            grid,
            repetition: repetition.max(1),
        }
    }

    /// Create an encoder from validated signal options.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::InvalidGrid`] for an unusable grid shape.
    pub fn from_options(options: &SignalOptions) -> Result<Self, SubgridError> {
        Ok(Self::new(options.grid_spec()?, options.repetition))
    }

    /// The grid packets are sized for.
    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// How many times each packet is repeated in a sequence.
    pub fn repetition(&self) -> usize {
        self.repetition
    }

    /// Split text into null-padded packets, one per capacity-sized chunk.
    ///
    /// Empty text yields no packets.
    pub fn text_to_packets(&self, text: &str) -> Vec<Packet> {
        text_to_codes(text)
            .chunks(self.grid.capacity_chars())
            .map(|chunk| self.padded(chunk))
            .collect()
    }

    /// Pack text into a single packet, truncating anything past capacity.
    ///
    /// Truncation is silent: a string longer than the capacity packs exactly
    /// like its first `capacity_chars` characters.
    pub fn pack(&self, text: &str) -> Packet {
        let codes = text_to_codes(text);
        let end = codes.len().min(self.grid.capacity_chars());
        self.padded(&codes[..end])
    }

    /// Serialize a packet to bits, eight per code, MSB-first.
    pub fn packet_to_bits(&self, packet: &Packet) -> BitSequence {
        let bits = packet
            .codes
            .iter()
            .flat_map(|&code| (0..8).rev().map(move |shift| (code >> shift) & 1 == 1))
            .collect();
        BitSequence { bits }
    }

    /// Serialize a packet straight to a row-major matrix.
    pub fn packet_to_matrix(&self, packet: &Packet) -> BitMatrix {
        let cols = self.grid.cols();
        let mut matrix = BitMatrix::zeros(self.grid);
        for (index, bit) in self.packet_to_bits(packet).bits.into_iter().enumerate() {
            if bit {
                matrix.set(index as u32 / cols, index as u32 % cols, true);
            }
        }
        matrix
    }

    /// Build the repetition-expanded sequence for a subtitle's text.
    ///
    /// Whitespace-only text yields an empty sequence.
    pub fn sequence(&self, text: &str) -> PacketSequence {
        if text.trim().is_empty() {
            return PacketSequence::default();
        }

        let base = self.text_to_packets(text);
        let distinct = base.len();
        let packets = base
            .into_iter()
            .flat_map(|packet| std::iter::repeat_n(packet, self.repetition))
            .collect();

        PacketSequence { packets, distinct }
    }

    /// Build a one-packet sequence holding `pack(text)`.
    ///
    /// Whitespace-only text yields an empty sequence.
    pub fn single(&self, text: &str) -> PacketSequence {
        if text.trim().is_empty() {
            return PacketSequence::default();
        }
        PacketSequence {
            packets: vec![self.pack(text)],
            distinct: 1,
        }
    }

    fn padded(&self, codes: &[u8]) -> Packet {
        let mut padded = codes.to_vec();
        padded.resize(self.grid.capacity_chars(), 0);
        Packet { codes: padded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> PacketEncoder {
        PacketEncoder::new(GridSpec::default(), 4)
    }

    #[test]
    fn wide_characters_fall_back() {
        assert_eq!(text_to_codes("a\u{e9}\u{263a}"), vec![b'a', 0xe9, b'?']);
    }

    #[test]
    fn empty_text_has_no_packets() {
        assert!(encoder().text_to_packets("").is_empty());
        assert!(encoder().sequence("").is_empty());
    }

    #[test]
    fn whitespace_only_sequence_is_empty() {
        assert!(encoder().sequence("   ").is_empty());
    }

    #[test]
    fn chunks_are_padded() {
        let packets = encoder().text_to_packets("ABCDEFGHIJKLMNOPQRSTU");
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].text(), "ABCDEFGHIJKLMNOPQR");
        assert_eq!(packets[1].text(), "STU");
        assert_eq!(packets[1].codes().len(), 18);
        assert!(packets[1].codes()[3..].iter().all(|&code| code == 0));
    }

    #[test]
    fn bits_are_msb_first() {
        let bits = encoder().packet_to_bits(&encoder().pack("A"));
        assert_eq!(&bits.to_string()[..8], "01000001");
        assert_eq!(bits.len(), 144);
    }

    #[test]
    fn bits_to_text_stops_at_null() {
        let mut bits = Vec::new();
        for code in [b'O', b'K', 0, b'X'] {
            bits.extend((0..8).rev().map(|shift| (code >> shift) & 1 == 1));
        }
        assert_eq!(bits_to_text(&bits), "OK");
    }

    #[test]
    fn bits_to_text_ignores_partial_byte() {
        let mut bits: Vec<bool> = (0..8).rev().map(|shift| (b'Z' >> shift) & 1 == 1).collect();
        bits.extend([true, true, true]);
        assert_eq!(bits_to_text(&bits), "Z");
    }

    #[test]
    fn repetition_zero_clamps_to_one() {
        let encoder = PacketEncoder::new(GridSpec::default(), 0);
        assert_eq!(encoder.repetition(), 1);
        assert_eq!(encoder.sequence("hello").len(), 1);
    }
}
