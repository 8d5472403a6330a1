//! Flat word-move programs derived from a calling sequence.
//!
//! A [`ShuffleRecipe`] moves raw 64-bit words between the managed side (an
//! argument array and a return array, one word per binding) and the native
//! register and stack image. The recipe of a downcall moves managed words to
//! native storage before the call and native return words back after it; the
//! recipe of an upcall does the opposite.
use std::fmt;

use crate::{CallingSequence, Direction, RegClass, Storage};

/// A word location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Word of the managed argument array.
    Managed(u16),
    /// Word of the managed return array.
    ManagedRet(u8),
    IntReg(u8),
    VecReg(u8),
    /// Word of the outgoing stack area, shadow space included.
    Stack(u32),
    IntRet(u8),
    VecRet(u8),
}

impl Slot {
    fn native(storage: Storage, ret: bool) -> Self {
        match (storage, ret) {
            (Storage::Reg { class: RegClass::Integer, index }, false) => Self::IntReg(index),
            (Storage::Reg { class: RegClass::Vector, index }, false) => Self::VecReg(index),
            (Storage::Reg { class: RegClass::Integer, index }, true) => Self::IntRet(index),
            (Storage::Reg { class: RegClass::Vector, index }, true) => Self::VecRet(index),
            (Storage::Stack { offset }, _) => Self::Stack(offset / 8),
        }
    }

    pub fn is_managed(self) -> bool {
        matches!(self, Self::Managed(_) | Self::ManagedRet(_))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed(idx) => write!(f, "m{idx}"),
            Self::ManagedRet(idx) => write!(f, "r{idx}"),
            Self::IntReg(idx) => write!(f, "int{idx}"),
            Self::VecReg(idx) => write!(f, "vec{idx}"),
            Self::Stack(idx) => write!(f, "stack[{idx}]"),
            Self::IntRet(idx) => write!(f, "ret.int{idx}"),
            Self::VecRet(idx) => write!(f, "ret.vec{idx}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub src: Slot,
    pub dst: Slot,
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleRecipe {
    direction: Direction,
    /// Moves run before the target is entered.
    arguments: Vec<Move>,
    /// Moves run after the target returns.
    returns: Vec<Move>,
    managed_words: usize,
    managed_ret_words: usize,
    stack_words: usize,
}

impl ShuffleRecipe {
    pub fn for_sequence(seq: &CallingSequence) -> Self {
        let direction = seq.direction();
        let oriented = |managed: Slot, native: Slot| match direction {
            Direction::Downcall => Move {
                src: managed,
                dst: native,
            },
            Direction::Upcall => Move {
                src: native,
                dst: managed,
            },
        };

        let arguments = seq
            .arg_bindings()
            .iter()
            .enumerate()
            .map(|(idx, b)| oriented(Slot::Managed(idx as u16), Slot::native(b.storage, false)))
            .collect();

        // Return words flow against the arguments.
        let returns = seq
            .ret_bindings()
            .iter()
            .enumerate()
            .map(|(idx, b)| {
                let mv = oriented(Slot::ManagedRet(idx as u8), Slot::native(b.storage, true));
                Move {
                    src: mv.dst,
                    dst: mv.src,
                }
            })
            .collect();

        Self {
            direction,
            arguments,
            returns,
            managed_words: seq.arg_bindings().len(),
            managed_ret_words: seq.ret_bindings().len(),
            stack_words: (seq.stack_size() / 8) as usize,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn arguments(&self) -> &[Move] {
        &self.arguments
    }

    pub fn returns(&self) -> &[Move] {
        &self.returns
    }

    pub fn managed_words(&self) -> usize {
        self.managed_words
    }

    pub fn managed_ret_words(&self) -> usize {
        self.managed_ret_words
    }

    pub fn stack_words(&self) -> usize {
        self.stack_words
    }
}

impl fmt::Display for ShuffleRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} words={} ret_words={} stack_words={}",
            self.direction, self.managed_words, self.managed_ret_words, self.stack_words
        )?;
        for mv in &self.arguments {
            writeln!(f, "  {mv}")?;
        }
        write!(f, "  call")?;
        for mv in &self.returns {
            write!(f, "\n  {mv}")?;
        }
        Ok(())
    }
}
