//! Upcall stubs: native entry points that call managed targets.
//!
//! A stub boxes its arguments from the register image using the upcall
//! arrangement of its descriptor, calls the target and lowers the result
//! back into the return registers, or into the caller's return buffer.
//! Target failures, panics included, are stopped at the stub and handled
//! by the linker's [`UpcallFailurePolicy`].
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use sluice_abi::{ArgumentClass, Arrangement, BindingSource, Direction, Slot};
use sluice_layout::FunctionDescriptor;
use sluice_memory::{ExecContext, MemoryAddress, Scope, ScopeFlags};
use tracing::{debug, error};

use crate::{
    linker::Runtime,
    value::{box_word, load_word, store_word},
    InvokeError, ManagedValue, NativeFrame, Trampoline, UpcallFailurePolicy, UpcallFn,
};

/// Installs a stub for `target` whose lifetime ends when `scope` closes.
pub(crate) fn install_stub(
    runtime: &Arc<Runtime>,
    cx: &ExecContext,
    target: UpcallFn,
    descriptor: &FunctionDescriptor,
    scope: &Scope,
) -> Result<MemoryAddress, InvokeError> {
    scope.check_access(cx)?;
    let arrangement = runtime
        .cache
        .get_or_arrange(runtime.conv, descriptor, Direction::Upcall)?;

    let dispatcher = Dispatcher {
        arrangement,
        target,
        policy: runtime.config.upcall_failure,
        global: runtime.global.clone(),
        unchecked: runtime.unchecked.clone(),
    };
    let address = runtime.trampoline.install(Arc::new(
        move |_: &dyn Trampoline, frame: &mut NativeFrame| dispatcher.dispatch(frame),
    ));

    let trampoline = runtime.trampoline.clone();
    let released = scope.add_close_action(cx, move || {
        trampoline.uninstall(address);
        debug!(address = format_args!("{address:#x}"), "released upcall stub");
    });
    if let Err(err) = released {
        runtime.trampoline.uninstall(address);
        return Err(err.into());
    }

    debug!(
        address = format_args!("{address:#x}"),
        scope = %scope.id(),
        %descriptor,
        "installed upcall stub"
    );
    Ok(MemoryAddress::native(address, scope.clone()))
}

struct Dispatcher {
    arrangement: Arc<Arrangement>,
    target: UpcallFn,
    policy: UpcallFailurePolicy,
    /// Parent of the per-call argument scopes.
    global: Scope,
    /// Owner of raw addresses received from native code.
    unchecked: Scope,
}

impl Dispatcher {
    fn dispatch(&self, frame: &mut NativeFrame) {
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.run(frame))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        match self.policy {
            UpcallFailurePolicy::Abort => {
                error!(%reason, "upcall failed, aborting");
                std::process::abort();
            }
            UpcallFailurePolicy::Sentinel => {
                error!(%reason, "upcall failed, returning zero");
                for mv in self.arrangement.recipe.returns() {
                    frame.write(mv.dst, 0);
                }
            }
        }
    }

    /// Runs the target with arguments boxed in a scope of their own, closed
    /// once the result is lowered.
    fn run(&self, frame: &mut NativeFrame) -> Result<(), InvokeError> {
        let cx = ExecContext::new();
        let arena = self.global.fork(&cx, ScopeFlags::empty())?;
        let result = self.run_in(&cx, &arena, frame);
        let closed = arena.close(&cx);
        result?;
        closed?;
        Ok(())
    }

    fn run_in(
        &self,
        cx: &ExecContext,
        arena: &Scope,
        frame: &mut NativeFrame,
    ) -> Result<(), InvokeError> {
        let seq = &self.arrangement.sequence;
        let recipe = &self.arrangement.recipe;
        let desc = seq.descriptor();

        let mut managed = vec![0u64; recipe.managed_words()];
        for mv in recipe.arguments() {
            let Slot::Managed(idx) = mv.dst else {
                unreachable!("upcall arguments move to managed slots")
            };
            managed[idx as usize] = frame.read(mv.src);
        }

        let mut ret_buffer = None;
        let mut args: Vec<Option<ManagedValue>> = vec![None; desc.args().len()];
        for (binding, &word) in seq.arg_bindings().iter().zip(&managed) {
            let idx = match binding.source {
                BindingSource::Argument(idx) => idx,
                BindingSource::ReturnBuffer => {
                    ret_buffer = Some(word);
                    continue;
                }
                BindingSource::Return => unreachable!("return bindings are not arguments"),
            };
            let layout = &desc.args()[idx];

            match binding.class {
                ArgumentClass::StructRegister => {
                    if args[idx].is_none() {
                        args[idx] = Some(ManagedValue::Struct(arena.allocate_layout(cx, layout)?));
                    }
                    let Some(ManagedValue::Struct(segment)) = &args[idx] else {
                        unreachable!("register aggregates are boxed as structs")
                    };
                    store_word(cx, segment, binding.offset, binding.size, word)?;
                }
                ArgumentClass::StructReference => {
                    let address = MemoryAddress::native(word, self.unchecked.clone());
                    // SAFETY: the caller keeps its copy alive for the call.
                    let view = unsafe { address.as_direct_view(layout.byte_size()?)? };
                    args[idx] = Some(ManagedValue::Struct(view));
                }
                // A duplicated variadic float is read from its first binding.
                _ if args[idx].is_some() => {}
                _ => args[idx] = Some(box_word(layout, word, &self.unchecked)),
            }
        }
        let args: Vec<_> = args
            .into_iter()
            .map(|arg| arg.expect("every argument has a binding"))
            .collect();

        let result = (self.target)(cx, arena, &args)?;

        let mut returned = vec![0u64; recipe.managed_ret_words()];
        match (desc.ret(), result) {
            (None, None) => {}
            (Some(layout), Some(value)) if value.matches(layout) => {
                match (seq.ret_class(), &value) {
                    (Some(ArgumentClass::Memory), ManagedValue::Struct(segment)) => {
                        let buffer = ret_buffer.expect("memory returns have a buffer");
                        let address = MemoryAddress::native(buffer, self.unchecked.clone());
                        // SAFETY: the caller provides a buffer of the return size.
                        let view = unsafe { address.as_direct_view(segment.byte_size())? };
                        view.copy_from(cx, segment)?;
                        returned[0] = buffer;
                    }
                    (Some(ArgumentClass::StructRegister), ManagedValue::Struct(segment)) => {
                        for (binding, word) in seq.ret_bindings().iter().zip(&mut returned) {
                            *word = load_word(cx, segment, binding.offset, binding.size)?;
                        }
                    }
                    (_, ManagedValue::Scalar(scalar)) => returned[0] = scalar.to_bits(),
                    (_, ManagedValue::Address(address)) => returned[0] = address.to_raw(cx)?,
                    (_, other) => {
                        return Err(InvokeError::ReturnMismatch {
                            expected: layout.to_string(),
                            found: other.describe(),
                        })
                    }
                }
            }
            (ret, value) => {
                return Err(InvokeError::ReturnMismatch {
                    expected: ret.map_or_else(|| "void".to_string(), ToString::to_string),
                    found: value.map_or_else(|| "nothing".to_string(), |v| v.describe()),
                })
            }
        }

        for mv in recipe.returns() {
            let Slot::ManagedRet(idx) = mv.src else {
                unreachable!("upcall returns move from managed slots")
            };
            frame.write(mv.dst, returned[idx as usize]);
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {msg}")
    } else {
        "panic".to_string()
    }
}
