mod labels;
pub use labels::Labels;

mod phase;
pub use phase::Phase;

mod remote;
pub use remote::RemoteRunner;
