use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use types::PAGE_SIZE;

/// How chatty the session is. Fault diagnostics are only produced in
/// `Debug` and `Dump`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    Off,
    #[default]
    Default,
    Debug,
    Dump,
}

impl OutputMode {
    pub fn is_verbose(self) -> bool {
        matches!(self, OutputMode::Debug | OutputMode::Dump)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(OutputMode::Off),
            "default" => Some(OutputMode::Default),
            "debug" => Some(OutputMode::Debug),
            "dump" => Some(OutputMode::Dump),
            _ => None,
        }
    }
}

/// Observable behaviours kept for compatibility. Each can be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quirks {
    /// With explicit stack address and size, the size lands in the address
    /// field and the size field keeps its default.
    pub stack_size_overwrites_address: bool,
    /// Reuse a free chunk whose size equals the request. Off means only
    /// strictly larger chunks are reused.
    pub heap_reuse_exact_fit: bool,
}

impl Default for Quirks {
    fn default() -> Self {
        Self {
            stack_size_overwrites_address: true,
            heap_reuse_exact_fit: false,
        }
    }
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub output: OutputMode,
    /// Host directory that the guest sees as `/`.
    pub rootfs: PathBuf,
    /// Host path of the executable.
    pub path: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Raw code to run instead of a loaded binary.
    pub shellcode: Option<Vec<u8>>,
    pub stack_address: Option<u64>,
    pub stack_size: Option<u64>,
    /// Stop address; `None` or `Some(0)` runs to the architecture's end sentinel.
    pub stop_address: Option<u64>,
    pub timeout: Option<Duration>,
    pub page_size: u64,
    /// Size of the heap range reserved at the mmap base.
    pub heap_size: u64,
    pub quirks: Quirks,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output: OutputMode::default(),
            rootfs: PathBuf::from("/"),
            path: PathBuf::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            shellcode: None,
            stack_address: None,
            stack_size: None,
            stop_address: None,
            timeout: None,
            page_size: PAGE_SIZE,
            heap_size: 0x500_0000,
            quirks: Quirks::default(),
        }
    }
}

impl SessionConfig {
    pub fn shellcode(code: impl Into<Vec<u8>>) -> Self {
        Self {
            shellcode: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn binary(rootfs: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_stack(mut self, address: Option<u64>, size: Option<u64>) -> Self {
        self.stack_address = address;
        self.stack_size = size;
        self
    }

    pub fn with_stop_address(mut self, address: u64) -> Self {
        self.stop_address = Some(address);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn is_shellcode(&self) -> bool {
        self.shellcode.is_some()
    }
}
