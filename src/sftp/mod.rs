//! SFTP file transfer support

pub mod error;
pub mod session;
pub mod transfer;

pub use error::SftpError;
pub use session::open_sftp;
pub use transfer::{download_file, upload_file, TransferProgress};
