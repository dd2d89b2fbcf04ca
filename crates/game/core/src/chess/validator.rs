//! Move validation and terminal detection.
//!
//! Both entry points are pure functions over immutable [`Position`] values and
//! can be called from any number of sessions concurrently.

use shakmaty::uci::UciMove;
use shakmaty::{Bitboard, Board, Piece, Position as _, Role};

use super::moves::{Move, Square};
use super::position::Position;

/// Why a candidate move was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RejectReason {
    #[error("the piece on the origin square belongs to the side not to move")]
    WrongSideToMove,

    #[error("the move breaks the movement rules of the piece")]
    IllegalGeometry,

    #[error("the move leaves the mover's king in check")]
    LeavesKingInCheck,

    #[error("promotion piece is missing or not allowed for this move")]
    MalformedPromotion,
}

/// Game-ending condition detectable from the board alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum TerminalStatus {
    None,
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMove,
    ThreefoldRepetition,
}

impl TerminalStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, TerminalStatus::None)
    }
}

/// Apply `mv` to `position`, returning the successor or the reason it is illegal.
///
/// The sequence number is not checked here; ply ordering belongs to the
/// session.
pub fn apply(position: &Position, mv: &Move) -> Result<Position, RejectReason> {
    let chess = position.chess();
    let board = chess.board();
    let turn = chess.turn();

    let from: shakmaty::Square = mv.from.into();
    let to: shakmaty::Square = mv.to.into();

    let piece = board.piece_at(from).ok_or(RejectReason::IllegalGeometry)?;
    if piece.color != turn {
        return Err(RejectReason::WrongSideToMove);
    }

    let last_rank = match turn {
        shakmaty::Color::White => 7,
        shakmaty::Color::Black => 0,
    };
    let reaches_last_rank = piece.role == Role::Pawn && mv.to.rank() == last_rank;
    match (reaches_last_rank, mv.promotion) {
        (true, None) | (false, Some(_)) => {
            if plausible_geometry(board, piece, mv.from, mv.to) || mv.promotion.is_some() {
                return Err(RejectReason::MalformedPromotion);
            }
            return Err(RejectReason::IllegalGeometry);
        }
        _ => {}
    }

    let uci = UciMove::Normal {
        from,
        to,
        promotion: mv.promotion.map(Into::into),
    };

    match uci.to_move(chess) {
        Ok(m) if chess.is_legal(&m) => Ok(position.successor(&m)),
        _ => Err(classify_illegal(board, piece, mv.from, mv.to)),
    }
}

/// Classify the board-level condition that ends the game, if any.
///
/// Checked in order of precedence: a mate on the board outranks a draw
/// condition that happens to coincide with it.
pub fn terminal_status(position: &Position) -> TerminalStatus {
    let chess = position.chess();
    if chess.is_checkmate() {
        TerminalStatus::Checkmate
    } else if chess.is_stalemate() {
        TerminalStatus::Stalemate
    } else if chess.is_insufficient_material() {
        TerminalStatus::InsufficientMaterial
    } else if position.halfmoves() >= 100 {
        TerminalStatus::FiftyMove
    } else if position.repetition_count() >= 3 {
        TerminalStatus::ThreefoldRepetition
    } else {
        TerminalStatus::None
    }
}

/// A move the rules engine refused is blamed on king safety only when the
/// piece could otherwise make that move and doing so exposes the king.
fn classify_illegal(board: &Board, piece: Piece, from: Square, to: Square) -> RejectReason {
    if !plausible_geometry(board, piece, from, to) {
        return RejectReason::IllegalGeometry;
    }

    let mut after = board.clone();
    let from_sq: shakmaty::Square = from.into();
    let to_sq: shakmaty::Square = to.into();
    after.remove_piece_at(from_sq);
    after.set_piece_at(to_sq, piece);

    let exposed = after
        .king_of(piece.color)
        .map(|king| {
            after
                .attacks_to(king, !piece.color, after.occupied())
                .any()
        })
        .unwrap_or(false);

    if exposed {
        RejectReason::LeavesKingInCheck
    } else {
        RejectReason::IllegalGeometry
    }
}

/// Whether `piece` could travel from `from` to `to` on this board, ignoring
/// king safety, castling and en passant.
fn plausible_geometry(board: &Board, piece: Piece, from: Square, to: Square) -> bool {
    let to_sq: shakmaty::Square = to.into();
    if board.by_color(piece.color).contains(to_sq) {
        return false;
    }

    if piece.role != Role::Pawn {
        let reach: Bitboard = shakmaty::attacks::attacks(from.into(), piece, board.occupied());
        return reach.contains(to_sq);
    }

    let forward: i16 = match piece.color {
        shakmaty::Color::White => 1,
        shakmaty::Color::Black => -1,
    };
    let start_rank: u8 = match piece.color {
        shakmaty::Color::White => 1,
        shakmaty::Color::Black => 6,
    };
    let rank_delta = i16::from(to.rank()) - i16::from(from.rank());
    let file_delta = (i16::from(to.file()) - i16::from(from.file())).abs();
    let target_occupied = board.occupied().contains(to_sq);

    match (file_delta, rank_delta) {
        (0, d) if d == forward => !target_occupied,
        (0, d) if d == 2 * forward && from.rank() == start_rank => {
            let between = Square::from_coords(from.file(), (i16::from(from.rank()) + forward) as u8);
            let between_empty = between
                .map(|sq| !board.occupied().contains(sq.into()))
                .unwrap_or(false);
            between_empty && !target_occupied
        }
        (1, d) if d == forward => target_occupied,
        _ => false,
    }
}
