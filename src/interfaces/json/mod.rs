pub mod callback_fields;
pub mod transaction_file;
