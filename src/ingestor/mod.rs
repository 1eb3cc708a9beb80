pub mod fetcher;
pub mod m3u_parser;

pub use fetcher::{FetchOutcome, FetchedPlaylist, SourceFetcher};
pub use m3u_parser::{parse_playlist, M3uParser, ParseStats};
