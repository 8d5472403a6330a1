use std::sync::Arc;

use smallvec::SmallVec;
use sluice_abi::{ArgumentClass, Arrangement, BindingSource, Slot};
use sluice_layout::{FunctionDescriptor, MemoryLayout};
use sluice_memory::{ExecContext, MemoryAddress, MemorySegment, Scope, ScopeFlags};
use tracing::trace;

use crate::{
    linker::Runtime,
    upcall,
    value::{box_word, load_word, store_word},
    InvokeError, ManagedValue, NativeFrame,
};

/// A callable native function.
///
/// Invocation checks the arguments against the descriptor, lowers them into
/// a [`NativeFrame`] by replaying the shuffle recipe, enters the target
/// through the linker's trampoline and boxes the result.
#[derive(Clone)]
pub struct DowncallHandle {
    runtime: Arc<Runtime>,
    target: MemoryAddress,
    arrangement: Arc<Arrangement>,
}

impl DowncallHandle {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        target: MemoryAddress,
        arrangement: Arc<Arrangement>,
    ) -> Self {
        Self {
            runtime,
            target,
            arrangement,
        }
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        self.arrangement.sequence.descriptor()
    }

    pub fn arrangement(&self) -> &Arrangement {
        &self.arrangement
    }

    /// Calls the function.
    ///
    /// Aggregate results are allocated in `scope` once the call has
    /// succeeded. Copies of aggregates passed by reference, the buffer for
    /// results returned in memory and stubs for callbacks live in a child of
    /// `scope` that is closed when the call returns.
    pub fn invoke(
        &self,
        cx: &ExecContext,
        scope: &Scope,
        args: &[ManagedValue],
    ) -> Result<Option<ManagedValue>, InvokeError> {
        let desc = self.descriptor();
        if args.len() != desc.args().len() {
            return Err(InvokeError::ArityMismatch {
                expected: desc.args().len(),
                found: args.len(),
            });
        }
        for (index, (arg, layout)) in args.iter().zip(desc.args()).enumerate() {
            if !arg.matches(layout) {
                return Err(InvokeError::ArgumentMismatch {
                    index,
                    expected: layout.to_string(),
                    found: arg.describe(),
                });
            }
        }

        let address = self.target.to_raw(cx)?;
        let call_scope = scope.fork(cx, ScopeFlags::empty())?;
        let result = self.invoke_in(cx, scope, &call_scope, address, args);
        let closed = call_scope.close(cx);
        let value = result?;
        closed?;
        Ok(value)
    }

    fn invoke_in(
        &self,
        cx: &ExecContext,
        scope: &Scope,
        call_scope: &Scope,
        address: u64,
        args: &[ManagedValue],
    ) -> Result<Option<ManagedValue>, InvokeError> {
        let seq = &self.arrangement.sequence;
        let recipe = &self.arrangement.recipe;
        let desc = seq.descriptor();

        let ret_buffer = match desc.ret() {
            Some(ret) if seq.returns_in_memory() => Some(call_scope.allocate_layout(cx, ret)?),
            _ => None,
        };

        // Words of a by-reference copy or a callback are computed once even
        // if an argument has several bindings.
        let mut indirect: SmallVec<[Option<u64>; 8]> = SmallVec::from_elem(None, args.len());
        let mut managed = Vec::with_capacity(recipe.managed_words());
        for binding in seq.arg_bindings() {
            let word = match binding.source {
                BindingSource::ReturnBuffer => ret_buffer
                    .as_ref()
                    .expect("memory returns have a buffer")
                    .address()
                    .to_raw(cx)?,
                BindingSource::Argument(idx) => {
                    let (arg, layout) = (&args[idx], &desc.args()[idx]);
                    match (binding.class, arg) {
                        (ArgumentClass::StructRegister, ManagedValue::Struct(segment)) => {
                            load_word(cx, segment, binding.offset, binding.size)?
                        }
                        (ArgumentClass::StructReference, ManagedValue::Struct(segment)) => {
                            match indirect[idx] {
                                Some(word) => word,
                                None => {
                                    let word = copy_argument(cx, call_scope, layout, segment)?;
                                    indirect[idx] = Some(word);
                                    word
                                }
                            }
                        }
                        (_, ManagedValue::Callback(callback)) => match indirect[idx] {
                            Some(word) => word,
                            None => {
                                let stub = upcall::install_stub(
                                    &self.runtime,
                                    cx,
                                    callback.target.clone(),
                                    &callback.descriptor,
                                    call_scope,
                                )?;
                                let word = stub.to_raw(cx)?;
                                indirect[idx] = Some(word);
                                word
                            }
                        },
                        (_, ManagedValue::Scalar(value)) => value.to_bits(),
                        (_, ManagedValue::Address(address)) => address.to_raw(cx)?,
                        // Arrays decay to the address of their first element.
                        (_, ManagedValue::Struct(segment)) => segment.address().to_raw(cx)?,
                    }
                }
                BindingSource::Return => unreachable!("return bindings are not arguments"),
            };
            managed.push(word);
        }

        let mut frame = NativeFrame::new(recipe.stack_words());
        for mv in recipe.arguments() {
            let Slot::Managed(idx) = mv.src else {
                unreachable!("downcall arguments move from managed slots")
            };
            frame.write(mv.dst, managed[idx as usize]);
        }

        trace!(
            address = format_args!("{address:#x}"),
            descriptor = %desc,
            "downcall"
        );
        self.runtime.trampoline.call(address, &mut frame)?;

        let mut returned = vec![0u64; recipe.managed_ret_words()];
        for mv in recipe.returns() {
            let Slot::ManagedRet(idx) = mv.dst else {
                unreachable!("downcall returns move to managed slots")
            };
            returned[idx as usize] = frame.read(mv.src);
        }

        let Some(ret) = desc.ret() else {
            return Ok(None);
        };
        let value = match seq.ret_class() {
            Some(ArgumentClass::Memory) => {
                let buffer = ret_buffer.expect("memory returns have a buffer");
                let segment = scope.allocate_layout(cx, ret)?;
                segment.copy_from(cx, &buffer)?;
                ManagedValue::Struct(segment)
            }
            Some(ArgumentClass::StructRegister) => {
                let segment = scope.allocate_layout(cx, ret)?;
                for (binding, word) in seq.ret_bindings().iter().zip(&returned) {
                    store_word(cx, &segment, binding.offset, binding.size, *word)?;
                }
                ManagedValue::Struct(segment)
            }
            _ => box_word(ret, returned[0], &self.runtime.unchecked),
        };
        Ok(Some(value))
    }
}

/// Copies an aggregate passed by reference and returns the copy's address.
fn copy_argument(
    cx: &ExecContext,
    call_scope: &Scope,
    layout: &MemoryLayout,
    segment: &MemorySegment,
) -> Result<u64, InvokeError> {
    let copy = call_scope.allocate_layout(cx, layout)?;
    copy.copy_from(cx, segment)?;
    Ok(copy.address().to_raw(cx)?)
}

impl std::fmt::Debug for DowncallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DowncallHandle")
            .field("target", &self.target)
            .field("descriptor", self.descriptor())
            .finish()
    }
}
