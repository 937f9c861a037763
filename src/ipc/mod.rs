//! Native messaging transport: length-prefixed JSON over stdio.

pub mod codec;
pub mod protocol;
