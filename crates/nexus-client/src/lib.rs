pub mod email;
pub mod extractor;
pub mod fetcher;
pub mod notifier;
pub mod transport;

pub use email::EmailChannel;
pub use extractor::SelectorExtractor;
pub use fetcher::ReqwestFetcher;
pub use notifier::ChannelNotifier;
pub use transport::ReqwestTransport;
