pub mod api_retrieval_strategy;
pub mod html_retrieval_strategy;
pub mod retrieval_strategy;
