use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use sluice_abi::convention;
use sluice_invoke::{
    Callback, InvokeError, Linker, LinkerConfig, Machine, ManagedValue, NativeFrame, Trampoline,
    UpcallFailurePolicy,
};
use sluice_layout::{FunctionDescriptor, MemoryLayout, ValueLayout};
use sluice_memory::{ExecContext, MemoryAddress, ScopeFlags, ScopeRegistry, Value};
use sluice_triple::CallConv;

fn linker(
    registry: &ScopeRegistry,
    machine: &Arc<Machine>,
    policy: UpcallFailurePolicy,
) -> Linker {
    let config = LinkerConfig::default().with_upcall_failure(policy);
    Linker::new(
        registry,
        convention(CallConv::Win64).unwrap(),
        machine.clone(),
        config,
    )
}

fn read_i32(cx: &ExecContext, address: &MemoryAddress) -> Result<i32, InvokeError> {
    // SAFETY: the address points into a live array of i32.
    let view = unsafe { address.as_direct_view(4)? };
    match view.get(cx, &ValueLayout::I32, 0)? {
        Value::I32(v) => Ok(v),
        other => Err(InvokeError::target(format!("unexpected {other:?}"))),
    }
}

#[test]
fn native_sort_calls_back_into_managed_comparator() {
    let cx = ExecContext::new();
    let registry = ScopeRegistry::new(Default::default()).unwrap();
    let machine = Arc::new(Machine::new());
    let linker = linker(&registry, &machine, UpcallFailurePolicy::Abort);

    // sort_i32(base, count, cmp): a bubble sort over an i32 array.
    let sort = machine.define("sort_i32", |trampoline, frame| {
        let base = frame.int(0) as *mut i32;
        let count = frame.int(1) as usize;
        let cmp = frame.int(2);
        for i in 0..count {
            for j in 0..count - 1 - i {
                // SAFETY: base points to `count` elements.
                let (a, b) = unsafe { (base.add(j), base.add(j + 1)) };
                let mut call = NativeFrame::new(4);
                call.set_int(0, a as u64);
                call.set_int(1, b as u64);
                trampoline.call(cmp, &mut call).unwrap();
                if call.int_ret(0) as i32 > 0 {
                    unsafe { std::ptr::swap(a, b) };
                }
            }
        }
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let compare = Callback::new(
        FunctionDescriptor::of(ValueLayout::I32, [ValueLayout::ADDRESS, ValueLayout::ADDRESS]),
        move |cx, _, args| {
            counter.fetch_add(1, Ordering::Relaxed);
            let a = read_i32(cx, args[0].as_address().unwrap())?;
            let b = read_i32(cx, args[1].as_address().unwrap())?;
            Ok(Some(Value::I32(a.cmp(&b) as i32).into()))
        },
    );

    let desc = FunctionDescriptor::of_void([
        MemoryLayout::unbounded_sequence_of(ValueLayout::I32),
        ValueLayout::I64.into(),
        ValueLayout::ADDRESS.into(),
    ]);
    let handle = linker
        .downcall_handle(MemoryAddress::native(sort, registry.unchecked()), &desc)
        .unwrap();

    let scope = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
    let values = [5, -1, 3, 0, 2];
    let array = scope
        .allocate_array(&cx, &ValueLayout::I32.into(), values.len() as u64)
        .unwrap();
    for (i, v) in values.iter().enumerate() {
        array
            .set(&cx, &ValueLayout::I32, i as u64 * 4, Value::I32(*v))
            .unwrap();
    }

    let installed = machine.len();
    let ret = handle
        .invoke(
            &cx,
            &scope,
            &[array.clone().into(), Value::I64(5).into(), compare.into()],
        )
        .unwrap();
    assert!(ret.is_none());
    assert_eq!(calls.load(Ordering::Relaxed), 10);
    // The stub lived for the call only.
    assert_eq!(machine.len(), installed);
    // Ten upcall arenas shared one record: the roots, `scope`, the call
    // scope and the arena.
    assert_eq!(registry.records(), 5);

    let sorted: Vec<_> = (0..5)
        .map(|i| array.get(&cx, &ValueLayout::I32, i * 4).unwrap())
        .collect();
    assert_eq!(
        sorted,
        [-1, 0, 2, 3, 5].map(Value::I32)
    );
}

#[test]
fn stub_lifetime_follows_its_scope() {
    let cx = ExecContext::new();
    let registry = ScopeRegistry::new(Default::default()).unwrap();
    let machine = Arc::new(Machine::new());
    let linker = linker(&registry, &machine, UpcallFailurePolicy::Abort);

    let desc = FunctionDescriptor::of(ValueLayout::I32, [ValueLayout::I32, ValueLayout::I32]);
    let scope = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
    let stub = linker
        .upcall_stub(&cx, &desc, &scope, |_, _, args| {
            let (Some(Value::I32(a)), Some(Value::I32(b))) =
                (args[0].as_scalar(), args[1].as_scalar())
            else {
                return Err(InvokeError::target("expected two i32"));
            };
            Ok(Some(Value::I32(a + b).into()))
        })
        .unwrap();
    assert_eq!(stub.scope(), &scope);

    let handle = linker.downcall_handle(stub.clone(), &desc).unwrap();
    let add = |x, y| {
        handle
            .invoke(&cx, &registry.global(), &[Value::I32(x).into(), Value::I32(y).into()])
            .map(|ret| ret.and_then(|ret| ret.as_scalar()))
    };
    assert_eq!(add(40, 2).unwrap(), Some(Value::I32(42)));

    // Merging hands the stub over to the parent scope.
    let child = scope.fork(&cx, ScopeFlags::empty()).unwrap();
    let inner = linker
        .upcall_stub(&cx, &desc, &child, |_, _, _| Ok(Some(Value::I32(0).into())))
        .unwrap();
    let raw_inner = inner.to_raw(&cx).unwrap();
    child.merge(&cx).unwrap();
    assert_eq!(machine.len(), 2);

    let raw = stub.to_raw(&cx).unwrap();
    scope.close(&cx).unwrap();
    assert!(machine.is_empty());
    assert!(matches!(add(1, 2), Err(InvokeError::Memory(_))));
    assert!(matches!(
        machine.call(raw, &mut NativeFrame::new(4)),
        Err(InvokeError::UnknownFunction(_))
    ));
    assert!(machine.call(raw_inner, &mut NativeFrame::new(4)).is_err());
}

#[test]
fn aggregates_cross_in_both_directions() {
    let cx = ExecContext::new();
    let registry = ScopeRegistry::new(Default::default()).unwrap();
    let machine = Arc::new(Machine::new());
    let linker = linker(&registry, &machine, UpcallFailurePolicy::Abort);
    let scope = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();

    let point = MemoryLayout::struct_of([ValueLayout::I32, ValueLayout::I32]);
    let pair = MemoryLayout::struct_of([ValueLayout::I64, ValueLayout::I64]);
    let five = MemoryLayout::struct_of(vec![ValueLayout::I64; 5]);

    // A register-sized struct in, a register-sized struct out.
    let swap_desc = FunctionDescriptor::of(point.clone(), [point.clone()]);
    let swap = linker
        .upcall_stub(&cx, &swap_desc, &scope, {
            let point = point.clone();
            move |cx, arena, args| {
                let src = args[0].as_struct().unwrap();
                let dst = arena.allocate_layout(cx, &point)?;
                dst.set(cx, &ValueLayout::I32, 0, src.get(cx, &ValueLayout::I32, 4)?)?;
                dst.set(cx, &ValueLayout::I32, 4, src.get(cx, &ValueLayout::I32, 0)?)?;
                Ok(Some(dst.into()))
            }
        })
        .unwrap();
    let input = scope.allocate_layout(&cx, &point).unwrap();
    input.set(&cx, &ValueLayout::I32, 0, Value::I32(1)).unwrap();
    input.set(&cx, &ValueLayout::I32, 4, Value::I32(2)).unwrap();
    let ret = linker
        .downcall_handle(swap, &swap_desc)
        .unwrap()
        .invoke(&cx, &scope, &[input.into()])
        .unwrap()
        .unwrap();
    let ret = ret.as_struct().unwrap();
    assert_eq!(ret.get(&cx, &ValueLayout::I32, 0), Ok(Value::I32(2)));
    assert_eq!(ret.get(&cx, &ValueLayout::I32, 4), Ok(Value::I32(1)));

    // A struct by reference in, a struct through the return buffer out.
    let spread_desc = FunctionDescriptor::of(five.clone(), [pair.clone()]);
    let spread = linker
        .upcall_stub(&cx, &spread_desc, &scope, {
            let five = five.clone();
            move |cx, arena, args| {
                let src = args[0].as_struct().unwrap();
                let Value::I64(a) = src.get(cx, &ValueLayout::I64, 0)? else {
                    unreachable!()
                };
                let Value::I64(b) = src.get(cx, &ValueLayout::I64, 8)? else {
                    unreachable!()
                };
                let dst = arena.allocate_layout(cx, &five)?;
                for i in 0..5 {
                    dst.set(cx, &ValueLayout::I64, i * 8, Value::I64(a + b * i as i64))?;
                }
                Ok(Some(dst.into()))
            }
        })
        .unwrap();
    let input = scope.allocate_layout(&cx, &pair).unwrap();
    input.set(&cx, &ValueLayout::I64, 0, Value::I64(7)).unwrap();
    input.set(&cx, &ValueLayout::I64, 8, Value::I64(3)).unwrap();
    let ret = linker
        .downcall_handle(spread, &spread_desc)
        .unwrap()
        .invoke(&cx, &scope, &[input.into()])
        .unwrap()
        .unwrap();
    let ret = ret.as_struct().unwrap();
    let words: Vec<_> = (0..5)
        .map(|i| ret.get(&cx, &ValueLayout::I64, i * 8).unwrap())
        .collect();
    assert_eq!(words, [7, 10, 13, 16, 19].map(Value::I64));
}

#[test]
fn sentinel_policy_returns_zero() {
    let cx = ExecContext::new();
    let registry = ScopeRegistry::new(Default::default()).unwrap();
    let machine = Arc::new(Machine::new());
    let linker = linker(&registry, &machine, UpcallFailurePolicy::Sentinel);
    assert_eq!(
        LinkerConfig::default().upcall_failure,
        UpcallFailurePolicy::Abort
    );

    let desc = FunctionDescriptor::of(ValueLayout::I32, [ValueLayout::I32]);
    let global = registry.global();
    let call = |stub: MemoryAddress| {
        linker
            .downcall_handle(stub, &desc)
            .unwrap()
            .invoke(&cx, &global, &[Value::I32(5).into()])
            .unwrap()
            .and_then(|ret| ret.as_scalar())
    };

    let failing = linker
        .upcall_stub(&cx, &desc, &global, |_, _, _| Err(InvokeError::target("no")))
        .unwrap();
    assert_eq!(call(failing), Some(Value::I32(0)));

    let panicking = linker
        .upcall_stub(&cx, &desc, &global, |_, _, _| panic!("target panicked"))
        .unwrap();
    assert_eq!(call(panicking), Some(Value::I32(0)));

    let mismatched = linker
        .upcall_stub(&cx, &desc, &global, |_, _, _| {
            Ok(Some(ManagedValue::from(Value::I64(1))))
        })
        .unwrap();
    assert_eq!(call(mismatched), Some(Value::I32(0)));

    let echo = linker
        .upcall_stub(&cx, &desc, &global, |_, _, args| Ok(Some(args[0].clone())))
        .unwrap();
    assert_eq!(call(echo), Some(Value::I32(5)));
}
