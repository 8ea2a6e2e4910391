pub mod ms {
    pub const NETWORK_QUIET: u64 = 500;
    pub const PAGE_CLOSE_SETTLE: u64 = 100;
}

pub mod secs {
    pub const REQUEST: u64 = 60;
    pub const RESPONSE_LOAD: u64 = 30;
    pub const KNOWN_PATHS: u64 = 10;
    pub const BROWSER_CLOSE: u64 = 10;
}
