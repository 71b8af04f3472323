pub mod category;
pub mod error;
pub mod money;
pub mod statement;
pub mod transaction;

pub use category::{CategoryKeyword, VendorCategoryMapping, DEFAULT_KEYWORDS, UNCATEGORIZED};
pub use error::IngestError;
pub use money::{Currency, Money, MoneyError};
pub use statement::{AccountMeta, SourceFormat, Statement, StatementId, StatementStatus};
pub use transaction::{
    CorrectionField, CorrectionRecord, DuplicateFlag, Transaction, TransactionId,
};
