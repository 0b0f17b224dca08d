pub mod footer;
pub mod header;
pub mod temporal;
pub mod utils;

pub use footer::draw_footer;
pub use header::draw_header;
pub use temporal::draw_temporal_bar;
pub use utils::{format_count, status_color, truncate};
