use sluice_layout::LayoutError;
use sluice_triple::CallConv;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("calling convention `{0}` is not supported")]
    UnsupportedConvention(CallConv),

    #[error("argument {index} of layout `{layout}` cannot be passed")]
    UnsupportedArgument { index: usize, layout: String },

    #[error("layout `{layout}` cannot be returned")]
    UnsupportedReturn { layout: String },

    #[error("variadic argument {index} of layout `{layout}` must be promoted")]
    UnpromotedVariadic { index: usize, layout: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
