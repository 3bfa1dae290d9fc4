pub mod large_transfer;
pub mod split;

pub use large_transfer::LargeTransferDetector;
pub use split::SplitPatternDetector;
