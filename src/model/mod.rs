pub mod fill;
pub mod order;
pub mod resting;

pub use fill::{FillEvent, MatchJob, MatchJobError};
pub use order::{CodecError, Order, OrderHash, Side, SignedOrder, TokenId, ValidationError};
pub use resting::{OrderStatus, RestingOrder};
