mod ledger;
mod loan;
mod member;
mod money;
mod savings;

pub use ledger::*;
pub use loan::*;
pub use member::*;
pub use money::*;
pub use savings::*;
