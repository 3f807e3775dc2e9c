use crate::primitives::array::ArrayOptions;

/// Common options used when opening an index for administrative commands.
#[derive(Clone, Debug, Default)]
pub struct AdminOpenOptions {
    /// Backend options for mapping the index files.
    pub array: ArrayOptions,
}

impl AdminOpenOptions {
    /// Replaces the array backend options.
    pub fn with_array_options(mut self, array: ArrayOptions) -> Self {
        self.array = array;
        self
    }
}
