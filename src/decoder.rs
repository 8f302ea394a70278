use std::fmt;

use serde::Serialize;

/// Symbol reported by the receiver chip for one tone pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DigitSymbol {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "*")]
    Star,
    #[serde(rename = "#")]
    Pound,
    A,
    B,
    C,
    D,
    #[serde(rename = "invalid")]
    Invalid,
}

/// Numeric code reported for anything outside the symbol table.
pub const INVALID_CODE: u8 = 99;

impl DigitSymbol {
    /// Symbols in code order; index `i` is bound to code `i + 1`.
    pub const TABLE: [DigitSymbol; 16] = [
        DigitSymbol::One,
        DigitSymbol::Two,
        DigitSymbol::Three,
        DigitSymbol::Four,
        DigitSymbol::Five,
        DigitSymbol::Six,
        DigitSymbol::Seven,
        DigitSymbol::Eight,
        DigitSymbol::Nine,
        DigitSymbol::Zero,
        DigitSymbol::Star,
        DigitSymbol::Pound,
        DigitSymbol::A,
        DigitSymbol::B,
        DigitSymbol::C,
        DigitSymbol::D,
    ];

    pub fn from_code(code: u8) -> Self {
        match code {
            1..=16 => Self::TABLE[usize::from(code - 1)],
            _ => DigitSymbol::Invalid,
        }
    }

    pub fn code(self) -> u8 {
        Self::TABLE
            .iter()
            .position(|s| *s == self)
            .map(|i| i as u8 + 1)
            .unwrap_or(INVALID_CODE)
    }

    pub fn is_valid(self) -> bool {
        self != DigitSymbol::Invalid
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DigitSymbol::Zero => "0",
            DigitSymbol::One => "1",
            DigitSymbol::Two => "2",
            DigitSymbol::Three => "3",
            DigitSymbol::Four => "4",
            DigitSymbol::Five => "5",
            DigitSymbol::Six => "6",
            DigitSymbol::Seven => "7",
            DigitSymbol::Eight => "8",
            DigitSymbol::Nine => "9",
            DigitSymbol::Star => "*",
            DigitSymbol::Pound => "#",
            DigitSymbol::A => "A",
            DigitSymbol::B => "B",
            DigitSymbol::C => "C",
            DigitSymbol::D => "D",
            DigitSymbol::Invalid => "invalid",
        }
    }
}

impl fmt::Display for DigitSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packs the sampled data lines into the 4-bit code, `bits[0]` least significant.
pub fn compose(bits: [bool; 4]) -> u8 {
    bits.iter()
        .enumerate()
        .fold(0, |code, (i, bit)| code | (u8::from(*bit) << i))
}

pub fn decode(bits: [bool; 4]) -> DigitSymbol {
    DigitSymbol::from_code(compose(bits))
}
