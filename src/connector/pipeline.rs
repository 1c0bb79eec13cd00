//! Pipeline Staging
//!
//! Accumulates sub-commands into one pooled item until the pipeline is
//! committed or cancelled. A connector holds at most one staging at a time.

use crate::core::codec::{encode_command, ArgWriter};
use crate::transport::ItemBox;

/// Pipeline under construction.
#[derive(Debug)]
pub struct PipelineStaging {
    item: ItemBox,
    writer: ArgWriter,
    commands: usize,
}

impl PipelineStaging {
    /// Start staging into `item`, reusing its payload buffer.
    pub fn new(mut item: ItemBox) -> Self {
        let writer = ArgWriter::reuse(std::mem::take(&mut item.payload));
        Self {
            item,
            writer,
            commands: 0,
        }
    }

    /// Append one sub-command.
    pub fn push<P: AsRef<[u8]>>(&mut self, name: &str, params: &[P]) {
        encode_command(&mut self.writer, name, params);
        self.commands += 1;
    }

    /// Sub-commands staged so far.
    pub fn len(&self) -> usize {
        self.commands
    }

    /// True if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.commands == 0
    }

    /// Finalize: the item with the encoded pipeline as its payload.
    pub fn finish(self) -> ItemBox {
        let mut item = self.item;
        item.payload = self.writer.into_bytes();
        item
    }

    /// Abandon: the bare item, for return to the pool.
    pub fn discard(self) -> ItemBox {
        self.item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{decode_command, ArgReader};
    use crate::transport::QueueItem;

    #[test]
    fn test_staged_commands_decode_in_order() {
        let mut staging = PipelineStaging::new(Box::new(QueueItem::default()));
        assert!(staging.is_empty());
        staging.push("SET", &["a", "1"]);
        staging.push::<&str>("PING", &[]);
        assert_eq!(staging.len(), 2);

        let item = staging.finish();
        let mut r = ArgReader::new(&item.payload);
        assert_eq!(decode_command(&mut r).unwrap().0, "SET");
        assert_eq!(decode_command(&mut r).unwrap().0, "PING");
        assert!(r.is_empty());
    }

    #[test]
    fn test_discard_returns_item() {
        let mut staging = PipelineStaging::new(Box::new(QueueItem {
            id: 3,
            ..Default::default()
        }));
        staging.push("GET", &["k"]);
        let item = staging.discard();
        assert_eq!(item.id, 3);
    }
}
