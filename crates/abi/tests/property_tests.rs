//! Property tests for classification and arrangement.
use std::collections::HashSet;

use proptest::prelude::*;
use sluice_abi::{arrange, convention, BindingSource, Direction, Position};
use sluice_layout::{FunctionDescriptor, MemoryLayout, ValueLayout};
use sluice_triple::CallConv;

fn scalar() -> impl Strategy<Value = MemoryLayout> {
    prop_oneof![
        Just(ValueLayout::BOOL),
        Just(ValueLayout::I8),
        Just(ValueLayout::I16),
        Just(ValueLayout::I32),
        Just(ValueLayout::I64),
        Just(ValueLayout::F32),
        Just(ValueLayout::F64),
        Just(ValueLayout::CHAR16),
        Just(ValueLayout::ADDRESS),
    ]
    .prop_map(MemoryLayout::from)
}

fn layout() -> impl Strategy<Value = MemoryLayout> {
    scalar().prop_recursive(2, 12, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(MemoryLayout::struct_of),
            prop::collection::vec(inner, 1..3).prop_map(MemoryLayout::union_of),
        ]
    })
}

fn descriptor() -> impl Strategy<Value = FunctionDescriptor> {
    (
        prop::option::of(layout()),
        prop::collection::vec(layout(), 0..8),
    )
        .prop_map(|(ret, args)| match ret {
            Some(ret) => FunctionDescriptor::of(ret, args),
            None => FunctionDescriptor::of_void(args),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Classifying the same layout twice gives the same class.
    #[test]
    fn classification_is_deterministic(layout in layout(), index in 0usize..8) {
        let win64 = convention(CallConv::Win64).unwrap();
        let position = Position::Argument { index, variadic: false };
        prop_assert_eq!(
            win64.classify(&layout, position),
            win64.classify(&layout.clone(), position)
        );
        prop_assert_eq!(
            win64.classify(&layout, Position::Return),
            win64.classify(&layout.without_names(), Position::Return)
        );
    }

    /// Every argument is bound, and no two words share a location.
    #[test]
    fn arrangement_is_complete_and_disjoint(desc in descriptor()) {
        let win64 = convention(CallConv::Win64).unwrap();
        let seq = arrange(win64, &desc, Direction::Downcall).unwrap();
        prop_assert_eq!(
            seq.to_string(),
            arrange(win64, &desc, Direction::Downcall).unwrap().to_string()
        );

        for idx in 0..desc.args().len() {
            prop_assert!(seq.bindings_of(idx).count() >= 1);
        }

        let mut seen = HashSet::new();
        for binding in seq.arg_bindings() {
            prop_assert!(seen.insert(binding.storage));
            prop_assert!(binding.size >= 1 && binding.size <= 8);
        }

        let hidden = seq
            .arg_bindings()
            .iter()
            .filter(|b| b.source == BindingSource::ReturnBuffer)
            .count();
        prop_assert_eq!(hidden, usize::from(seq.returns_in_memory()));
        prop_assert_eq!(seq.stack_size() % 16, 0);
    }
}
