//! Resource limits applied during configuration loading

/// Maximum depth of `%include` chains before loading is aborted.
///
/// Guards against include cycles; configurations that legitimately need
/// deeper chains should be restructured.
pub const MAX_INCLUDE_DEPTH: usize = 10;

/// Maximum section nesting depth in a single configuration.
pub const MAX_SECTION_DEPTH: usize = 64;
