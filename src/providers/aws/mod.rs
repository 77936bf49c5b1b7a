mod list;
mod objects;
mod types;

pub use types::AwsStore;
