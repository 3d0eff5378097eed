mod connectors;
mod domains;
mod logs;
mod providers;
mod records;

pub use connectors::*;
pub use domains::*;
pub use logs::*;
pub use providers::*;
pub use records::*;
