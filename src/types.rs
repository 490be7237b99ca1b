use alloy::rpc::types::{Block, Header, TransactionReceipt};

/// Ordering key used by the [`Sequencer`](crate::Sequencer) to restore
/// commit order across concurrent producers. In this pipeline the key is
/// the block height.
pub trait Sequenced {
    fn sequence(&self) -> u64;
}

/// Height/timestamp pair derived from a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeightTime {
    pub height: u64,
    /// Unix timestamp (seconds) taken from the header.
    pub timestamp: u64,
}

impl BlockHeightTime {
    pub fn from_header(header: &Header) -> Self {
        Self {
            height: header.number,
            timestamp: header.timestamp,
        }
    }
}

/// A fully fetched block: header/body, transactions, and the receipt list
/// aligned index-for-index with the transactions.
///
/// Built by a fetch worker on success, buffered by the sequencer until its
/// height is next in line, then handed to the downstream consumer. The
/// pipeline keeps no reference after release.
#[derive(Debug, Clone)]
pub struct FetchedBlock {
    pub block: Block,
    pub receipts: Vec<TransactionReceipt>,
    pub height_time: BlockHeightTime,
}

impl FetchedBlock {
    pub fn height(&self) -> u64 {
        self.height_time.height
    }

    pub fn timestamp(&self) -> u64 {
        self.height_time.timestamp
    }

    pub fn transaction_count(&self) -> usize {
        self.block.transactions.len()
    }
}

impl Sequenced for FetchedBlock {
    fn sequence(&self) -> u64 {
        self.height_time.height
    }
}
