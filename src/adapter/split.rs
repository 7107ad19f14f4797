//! Splits tagged with the spec that produced them.
//!
//! Wire layout, written and read in this order:
//!
//! ```text
//! u16 BE length | spec id (UTF-8)
//! u16 BE length | concrete split class name (UTF-8)
//! driver's own serialization of the split
//! ```

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use crate::configuration::Configuration;
use crate::context::ContextManager;
use crate::driver::InputSplit;
use crate::error::{IsolationError, Result};
use crate::library::LibraryManager;

/// A driver split plus the id of the spec it came from.
#[derive(Debug)]
pub struct IsolatedSplit {
    spec_id: String,
    native: Box<dyn InputSplit>,
}

impl IsolatedSplit {
    pub fn new(spec_id: impl Into<String>, native: Box<dyn InputSplit>) -> Self {
        Self {
            spec_id: spec_id.into(),
            native,
        }
    }

    pub fn spec_id(&self) -> &str {
        &self.spec_id
    }

    pub fn native(&self) -> &dyn InputSplit {
        self.native.as_ref()
    }

    pub fn into_native(self) -> Box<dyn InputSplit> {
        self.native
    }

    pub fn length(&self) -> u64 {
        self.native.length()
    }

    pub fn locations(&self) -> Vec<String> {
        self.native.locations()
    }

    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        write_string(out, &self.spec_id)?;
        write_string(out, self.native.class_name())?;
        self.native.write(out)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes: Vec<u8> = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a split written by [`IsolatedSplit::write_to`].
    ///
    /// The split class is resolved and its fields restored inside the
    /// context of the recorded spec.
    pub fn read_from(input: &mut dyn Read, manager: &ContextManager) -> Result<Self> {
        let spec_id = read_string(input)?;
        let class_name = read_string(input)?;

        let native = manager.run_in_context(&spec_id, |conf, call| {
            let mut split: Box<dyn InputSplit> = call.load_instance(&class_name, conf)?;
            split.read_fields(input)?;
            Ok(split)
        })?;

        tracing::trace!(spec = %spec_id, class = %class_name, "Deserialized split");
        Ok(Self { spec_id, native })
    }

    /// Rebuild the registries from the snapshot carried by `conf` and read
    /// one split from `bytes`.
    pub fn from_bytes(
        bytes: &[u8],
        conf: &Configuration,
        libraries: &Arc<LibraryManager>,
    ) -> Result<Self> {
        let manager = ContextManager::from_configuration(conf.clone(), Arc::clone(libraries))?;
        Self::read_from(&mut Cursor::new(bytes), &manager)
    }
}

fn write_string(out: &mut dyn Write, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        IsolationError::SplitEncoding(format!(
            "string of {} bytes exceeds the {} byte limit",
            value.len(),
            u16::MAX
        ))
    })?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

fn read_string(input: &mut dyn Read) -> Result<String> {
    let mut len = [0u8; 2];
    input.read_exact(&mut len)?;
    let mut bytes = vec![0u8; usize::from(u16::from_be_bytes(len))];
    input.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| IsolationError::SplitEncoding(e.to_string()))
}
