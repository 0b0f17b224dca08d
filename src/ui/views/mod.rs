mod map;
mod stats;
mod trends;

pub use map::MapView;
pub use stats::StatsView;
pub use trends::TrendsView;
