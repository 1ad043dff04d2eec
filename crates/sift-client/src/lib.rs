pub mod cleaner;
pub mod fetcher;
pub mod llm;

pub use cleaner::HtmlTextCleaner;
pub use fetcher::ReqwestFetcher;
pub use llm::OpenAiProvider;
