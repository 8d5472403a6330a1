//! Arrangement under a convention with independent register cursors.
use sluice_abi::{
    arrange, AbiError, ArgumentClass, CallConvention, Direction, Position, RegClass,
    RegisterAssignment, SequenceCache, Storage, VarargPolicy,
};
use sluice_layout::{Carrier, FunctionDescriptor, MemoryLayout, ValueLayout};
use sluice_triple::CallConv;

/// Three integer and two vector argument registers, aggregates of up to two
/// words in registers.
struct Toy;

impl CallConvention for Toy {
    fn call_conv(&self) -> CallConv {
        CallConv::SysV64
    }

    fn arg_registers(&self, class: RegClass) -> &'static [&'static str] {
        match class {
            RegClass::Integer => &["a0", "a1", "a2"],
            RegClass::Vector => &["f0", "f1"],
        }
    }

    fn ret_registers(&self, class: RegClass) -> &'static [&'static str] {
        match class {
            RegClass::Integer => &["a0", "a1"],
            RegClass::Vector => &["f0"],
        }
    }

    fn register_assignment(&self) -> RegisterAssignment {
        RegisterAssignment::PerClass
    }

    fn vararg_policy(&self) -> VarargPolicy {
        VarargPolicy::VectorOnly
    }

    fn stack_slot_size(&self) -> u64 {
        8
    }

    fn shadow_space(&self) -> u64 {
        0
    }

    fn classify(&self, layout: &MemoryLayout, position: Position) -> Result<ArgumentClass, AbiError> {
        match layout {
            MemoryLayout::Value(value) => Ok(match value.carrier() {
                Carrier::Address => ArgumentClass::Pointer,
                Carrier::F32 | Carrier::F64 => ArgumentClass::Float,
                _ => ArgumentClass::Integer,
            }),
            MemoryLayout::Group(_) => Ok(match (layout.byte_size()?, position) {
                (..=16, _) => ArgumentClass::StructRegister,
                (_, Position::Return) => ArgumentClass::Memory,
                (_, Position::Argument { .. }) => ArgumentClass::StructReference,
            }),
            MemoryLayout::Sequence(_) | MemoryLayout::Padding(_) => {
                Err(AbiError::UnsupportedReturn {
                    layout: layout.to_string(),
                })
            }
        }
    }
}

static TOY: Toy = Toy;

fn pair() -> MemoryLayout {
    MemoryLayout::struct_of([ValueLayout::I64, ValueLayout::I64])
}

#[test]
fn aggregates_split_into_words() {
    let desc = FunctionDescriptor::of(
        pair(),
        [
            pair(),
            pair(),
            MemoryLayout::from(ValueLayout::F64),
            ValueLayout::I32.into(),
        ],
    );
    let seq = arrange(&TOY, &desc, Direction::Downcall).unwrap();

    let ret: Vec<_> = seq
        .ret_bindings()
        .iter()
        .map(|b| (b.storage, b.offset, b.size))
        .collect();
    assert_eq!(ret, [(Storage::int(0), 0, 8), (Storage::int(1), 8, 8)]);

    let arg = |idx| {
        seq.bindings_of(idx)
            .map(|b| (b.storage, b.offset))
            .collect::<Vec<_>>()
    };
    assert_eq!(arg(0), [(Storage::int(0), 0), (Storage::int(1), 8)]);
    // Only one integer register is left, so the whole pair goes to the stack.
    assert_eq!(arg(1), [(Storage::stack(0), 0), (Storage::stack(8), 8)]);
    assert_eq!(arg(2), [(Storage::vec(0), 0)]);
    assert_eq!(arg(3), [(Storage::int(2), 0)]);
    assert_eq!(seq.stack_size(), 16);
}

#[test]
fn vector_registers_run_out_independently() {
    let desc = FunctionDescriptor::of_void([
        ValueLayout::F64,
        ValueLayout::F64,
        ValueLayout::F64,
        ValueLayout::I64,
    ]);
    let seq = arrange(&TOY, &desc, Direction::Downcall).unwrap();
    let storages: Vec<_> = seq.arg_bindings().iter().map(|b| b.storage).collect();
    assert_eq!(
        storages,
        [Storage::vec(0), Storage::vec(1), Storage::stack(0), Storage::int(0)]
    );
}

#[test]
fn vector_only_varargs_are_not_duplicated() {
    let desc = FunctionDescriptor::of_void([ValueLayout::ADDRESS, ValueLayout::F64])
        .with_first_variadic(1)
        .unwrap();
    let seq = arrange(&TOY, &desc, Direction::Downcall).unwrap();
    assert_eq!(seq.bindings_of(1).count(), 1);
    assert_eq!(seq.arg_class(1), ArgumentClass::Float);
}

#[test]
fn cache_keys_on_convention() {
    let cache = SequenceCache::new();
    let desc = FunctionDescriptor::of(ValueLayout::I32, [ValueLayout::I32]);
    let toy = cache.get_or_arrange(&TOY, &desc, Direction::Downcall).unwrap();
    let win64 = sluice_abi::convention(CallConv::Win64).unwrap();
    let native = cache.get_or_arrange(win64, &desc, Direction::Downcall).unwrap();

    assert_eq!(cache.len(), 2);
    assert_eq!(toy.sequence.convention().arg_registers(RegClass::Integer)[0], "a0");
    assert_eq!(native.sequence.convention().arg_registers(RegClass::Integer)[0], "rcx");
}
