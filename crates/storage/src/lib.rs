pub mod archive;
pub mod db;
pub mod store;

pub use archive::{archive_statement, ArchiveError};
pub use db::{
    count_transactions, create_db, create_memory_db, get_bank_profiles, get_category_keywords,
    get_statement, get_transaction, get_vendor_mappings, insert_correction, insert_statement,
    list_corrections, list_transactions, mark_statement_archived, replace_transactions,
    save_bank_profile, save_category_keyword, seed_default_keywords, set_statement_failed,
    set_statement_format,
    transactions_for_account, update_statement_status, update_transaction_amount,
    update_transaction_category, update_transaction_description, upsert_vendor_mapping, DbPool,
};
pub use store::{hash_upload, store_upload, upload_ext, upload_path};
