use sluice_abi::Slot;

/// Argument registers of each class a frame holds.
pub const ARG_REGS: usize = 8;
/// Return registers of each class a frame holds.
pub const RET_REGS: usize = 2;

/// The register and stack image of one native call.
///
/// Native code reads its arguments from the argument registers and the
/// stack, and leaves its results in the return registers. Stack words are
/// indexed from the start of the outgoing argument area, so on conventions
/// with shadow space the first stack argument is not at index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeFrame {
    int: [u64; ARG_REGS],
    vec: [u64; ARG_REGS],
    stack: Vec<u64>,
    int_ret: [u64; RET_REGS],
    vec_ret: [u64; RET_REGS],
}

impl NativeFrame {
    pub fn new(stack_words: usize) -> Self {
        Self {
            stack: vec![0; stack_words],
            ..Self::default()
        }
    }

    pub fn int(&self, idx: usize) -> u64 {
        self.int[idx]
    }

    pub fn set_int(&mut self, idx: usize, word: u64) {
        self.int[idx] = word;
    }

    pub fn vec(&self, idx: usize) -> u64 {
        self.vec[idx]
    }

    pub fn set_vec(&mut self, idx: usize, word: u64) {
        self.vec[idx] = word;
    }

    pub fn f64(&self, idx: usize) -> f64 {
        f64::from_bits(self.vec[idx])
    }

    pub fn stack(&self, idx: usize) -> u64 {
        self.stack[idx]
    }

    pub fn set_stack(&mut self, idx: usize, word: u64) {
        self.stack[idx] = word;
    }

    pub fn stack_words(&self) -> usize {
        self.stack.len()
    }

    pub fn int_ret(&self, idx: usize) -> u64 {
        self.int_ret[idx]
    }

    pub fn set_int_ret(&mut self, idx: usize, word: u64) {
        self.int_ret[idx] = word;
    }

    pub fn vec_ret(&self, idx: usize) -> u64 {
        self.vec_ret[idx]
    }

    pub fn set_vec_ret(&mut self, idx: usize, word: u64) {
        self.vec_ret[idx] = word;
    }

    pub fn set_f64_ret(&mut self, value: f64) {
        self.vec_ret[0] = value.to_bits();
    }

    /// Reads the word at a native slot.
    ///
    /// # Panics
    /// Panics if `slot` is a managed slot.
    pub fn read(&self, slot: Slot) -> u64 {
        match slot {
            Slot::IntReg(idx) => self.int[idx as usize],
            Slot::VecReg(idx) => self.vec[idx as usize],
            Slot::Stack(idx) => self.stack[idx as usize],
            Slot::IntRet(idx) => self.int_ret[idx as usize],
            Slot::VecRet(idx) => self.vec_ret[idx as usize],
            Slot::Managed(_) | Slot::ManagedRet(_) => {
                panic!("managed slot `{slot}` has no native storage")
            }
        }
    }

    /// Writes the word at a native slot.
    ///
    /// # Panics
    /// Panics if `slot` is a managed slot.
    pub fn write(&mut self, slot: Slot, word: u64) {
        let cell = match slot {
            Slot::IntReg(idx) => &mut self.int[idx as usize],
            Slot::VecReg(idx) => &mut self.vec[idx as usize],
            Slot::Stack(idx) => &mut self.stack[idx as usize],
            Slot::IntRet(idx) => &mut self.int_ret[idx as usize],
            Slot::VecRet(idx) => &mut self.vec_ret[idx as usize],
            Slot::Managed(_) | Slot::ManagedRet(_) => {
                panic!("managed slot `{slot}` has no native storage")
            }
        };
        *cell = word;
    }
}
