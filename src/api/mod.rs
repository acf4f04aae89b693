pub mod classify;
pub mod client;
pub mod logging;
#[cfg(test)]
pub mod mock_client;
pub mod stream;

pub use classify::classify_block;
pub use client::{ApiClient, ByteStream};
pub use stream::{BlockDecoder, EventStream, StreamParser};
