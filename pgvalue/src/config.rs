//! Buffer configuration.
use std::env::var;

const DEFAULT_READ_CAPACITY: usize = 8192;
const DEFAULT_WRITE_CAPACITY: usize = 8192;

/// Smallest transmit window, every simple value and length prefix must fit in it.
pub const MIN_WRITE_CAPACITY: usize = 64;

/// Read and transmit buffer configuration.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub(crate) read_capacity: usize,
    pub(crate) write_capacity: usize,
}

impl BufferConfig {
    /// Retrieve configuration from environment variable.
    ///
    /// It reads:
    /// - `PGVALUE_READ_BUFFER`
    /// - `PGVALUE_WRITE_BUFFER`
    ///
    /// Missing or invalid value fallback to default value.
    pub fn from_env() -> BufferConfig {
        macro_rules! env {
            ($name:literal,$def:expr) => {
                match var($name).ok().and_then(|e| e.parse().ok()) {
                    Some(ok) => ok,
                    None => $def,
                }
            };
        }

        Self::default()
            .read_capacity(env!("PGVALUE_READ_BUFFER", DEFAULT_READ_CAPACITY))
            .write_capacity(env!("PGVALUE_WRITE_BUFFER", DEFAULT_WRITE_CAPACITY))
    }

    /// Set the initial read buffer capacity.
    pub fn read_capacity(mut self, value: usize) -> Self {
        self.read_capacity = value.max(1);
        self
    }

    /// Set the transmit buffer size, which bound the size of every [`DirectWindow`].
    ///
    /// Value lower than [`MIN_WRITE_CAPACITY`] is raised to it.
    ///
    /// [`DirectWindow`]: crate::buffer::DirectWindow
    pub fn write_capacity(mut self, value: usize) -> Self {
        self.write_capacity = value.max(MIN_WRITE_CAPACITY);
        self
    }

    /// Get the read buffer capacity.
    pub fn get_read_capacity(&self) -> usize {
        self.read_capacity
    }

    /// Get the transmit buffer size.
    pub fn get_write_capacity(&self) -> usize {
        self.write_capacity
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            read_capacity: DEFAULT_READ_CAPACITY,
            write_capacity: DEFAULT_WRITE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_capacity_floor() {
        let config = BufferConfig::default().write_capacity(3);
        assert_eq!(config.get_write_capacity(), MIN_WRITE_CAPACITY);
        assert_eq!(config.get_read_capacity(), DEFAULT_READ_CAPACITY);
    }
}
