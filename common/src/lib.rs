pub mod addr;
pub mod header;
pub mod stream;
