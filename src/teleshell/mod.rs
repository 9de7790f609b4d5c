pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod coverage;
pub mod message;
pub mod paths;
pub mod picker;
pub mod pipeline;
pub mod summarizer;
pub mod transport;
pub mod util;
pub mod window;
