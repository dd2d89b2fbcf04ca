//! Fixed, versioned move representation accepted at the boundary.
//!
//! Clients send coordinate moves (`e2e4`, `e7e8q`). Anything that does not fit
//! this shape is rejected before it ever reaches the validator, so there is
//! no notation guessing downstream.

use std::fmt;
use std::str::FromStr;

/// Board square, `0 = a1` through `63 = h8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Square(u8);

impl Square {
    pub const fn new(index: u8) -> Option<Self> {
        if index < 64 { Some(Self(index)) } else { None }
    }

    pub const fn from_coords(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self(rank * 8 + file))
        } else {
            None
        }
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    /// 0-based file (`a = 0`).
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    /// 0-based rank (`1 = 0`).
    pub const fn rank(self) -> u8 {
        self.0 / 8
    }
}

impl TryFrom<u8> for Square {
    type Error = MoveParseError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Square::new(index).ok_or_else(|| MoveParseError::InvalidSquare(index.to_string()))
    }
}

impl From<Square> for u8 {
    fn from(square: Square) -> Self {
        square.0
    }
}

impl From<Square> for shakmaty::Square {
    fn from(square: Square) -> Self {
        shakmaty::Square::new(u32::from(square.0))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{file}{rank}")
    }
}

impl FromStr for Square {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(MoveParseError::InvalidSquare(s.to_string()));
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Square::from_coords(file, rank).ok_or_else(|| MoveParseError::InvalidSquare(s.to_string()))
    }
}

/// Piece a pawn may promote to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Promotion {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl Promotion {
    pub const fn as_char(self) -> char {
        match self {
            Promotion::Queen => 'q',
            Promotion::Rook => 'r',
            Promotion::Bishop => 'b',
            Promotion::Knight => 'n',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'q' => Some(Promotion::Queen),
            'r' => Some(Promotion::Rook),
            'b' => Some(Promotion::Bishop),
            'n' => Some(Promotion::Knight),
            _ => None,
        }
    }
}

impl From<Promotion> for shakmaty::Role {
    fn from(promotion: Promotion) -> Self {
        match promotion {
            Promotion::Queen => shakmaty::Role::Queen,
            Promotion::Rook => shakmaty::Role::Rook,
            Promotion::Bishop => shakmaty::Role::Bishop,
            Promotion::Knight => shakmaty::Role::Knight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveParseError {
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    #[error("invalid promotion piece: {0}")]
    InvalidPromotion(char),

    #[error("move must be 4 or 5 characters of coordinate notation, got {0:?}")]
    InvalidLength(String),

    #[error("origin and destination are the same square")]
    NullMove,
}

/// A proposed transition submitted by a participant.
///
/// `seq` is the 1-based ply number the client believes it is playing. The
/// session rejects any move whose `seq` is not exactly the next ply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Promotion>,
    pub seq: u32,
}

impl Move {
    pub fn new(from: Square, to: Square, seq: u32) -> Result<Self, MoveParseError> {
        if from == to {
            return Err(MoveParseError::NullMove);
        }
        Ok(Self {
            from,
            to,
            promotion: None,
            seq,
        })
    }

    pub fn with_promotion(mut self, promotion: Promotion) -> Self {
        self.promotion = Some(promotion);
        self
    }

    /// Parse coordinate notation such as `e2e4` or `a7a8q`.
    pub fn from_uci(text: &str, seq: u32) -> Result<Self, MoveParseError> {
        let text = text.trim();
        if !text.is_ascii() || !(4..=5).contains(&text.len()) {
            return Err(MoveParseError::InvalidLength(text.to_string()));
        }
        let from: Square = text[0..2].parse()?;
        let to: Square = text[2..4].parse()?;
        let mut mv = Move::new(from, to, seq)?;
        if let Some(c) = text[4..].chars().next() {
            let promotion = Promotion::from_char(c).ok_or(MoveParseError::InvalidPromotion(c))?;
            mv = mv.with_promotion(promotion);
        }
        Ok(mv)
    }

    /// Coordinate notation of this move.
    pub fn to_uci(&self) -> String {
        match self.promotion {
            Some(p) => format!("{}{}{}", self.from, self.to, p.as_char()),
            None => format!("{}{}", self.from, self.to),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_promotion_moves() {
        let mv = Move::from_uci("e2e4", 1).unwrap();
        assert_eq!(mv.from.to_string(), "e2");
        assert_eq!(mv.to.to_string(), "e4");
        assert_eq!(mv.promotion, None);

        let mv = Move::from_uci("a7a8N", 9).unwrap();
        assert_eq!(mv.promotion, Some(Promotion::Knight));
        assert_eq!(mv.to_uci(), "a7a8n");
        assert_eq!(mv.seq, 9);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(
            Move::from_uci("e2", 1),
            Err(MoveParseError::InvalidLength(_))
        ));
        assert!(matches!(
            Move::from_uci("i2e4", 1),
            Err(MoveParseError::InvalidSquare(_))
        ));
        assert_eq!(
            Move::from_uci("e7e8k", 1),
            Err(MoveParseError::InvalidPromotion('k'))
        );
        assert_eq!(Move::from_uci("e2e2", 1), Err(MoveParseError::NullMove));
    }

    #[test]
    fn square_coordinates() {
        let sq: Square = "h8".parse().unwrap();
        assert_eq!(sq.index(), 63);
        assert_eq!(sq.file(), 7);
        assert_eq!(sq.rank(), 7);
        assert_eq!(Square::new(64), None);
    }
}
