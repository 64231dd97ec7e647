//! Services that talk to the outside world: source pages and the remote library.

pub mod extractor;
pub mod fetcher;
pub mod remote;
pub mod uploader;

pub use extractor::{ContentExtractor, HtmlExtractor};
pub use fetcher::ReliableFetcher;
pub use remote::{CheckSyncResponse, HttpRemote, RemoteBook, RemoteStore, StatusSnapshot};
pub use uploader::{BatchUploader, UploadProgress};
