#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "8585")]
    pub port: u16,

    // origin written into episode sources and subtitle tracks, whatever the player can reach
    // like http://localhost:8585 or https://api.example.com
    #[clap(long, env, default_value = "http://localhost:8585")]
    pub public_base_url: String,

    // catalog site, used for the cookie bootstrap, the json api and the episode watch pages
    #[clap(long, env, default_value = "https://kisskh.co")]
    pub catalog_base_url: String,

    // leave empty to let chromiumoxide find chrome/chromium on the PATH
    #[clap(long, env)]
    pub chrome_executable: Option<String>,

    // either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // max browser pages the deep scraper keeps open at once
    #[clap(long, env, default_value = "5")]
    pub scraper_concurrency: usize,

    #[clap(long, env, default_value = "25")]
    pub episode_timeout_secs: u64,

    #[clap(long, env, default_value = "30")]
    pub resolve_timeout_secs: u64,

    // cache bounds, 0 means no bound for that dimension
    #[clap(long, env, default_value = "0")]
    pub media_cache_capacity: usize,

    #[clap(long, env, default_value = "0")]
    pub media_cache_ttl_secs: u64,

    #[clap(long, env, default_value = "0")]
    pub bandwidth_cache_capacity: usize,

    #[clap(long, env, default_value = "0")]
    pub bandwidth_cache_ttl_secs: u64,

    // background downloads land here, one file per job
    #[clap(long, env, default_value = "downloads")]
    pub download_dir: String,

    // finished and failed jobs the status route still knows about
    #[clap(long, env, default_value = "500")]
    pub download_history_capacity: usize,

    #[clap(long, env, default_value = "86400")]
    pub download_history_ttl_secs: u64,

    // production logs roll daily in here
    #[clap(long, env, default_value = "logs")]
    pub log_dir: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// proxy routes as seen from the outside, no trailing slash
    pub fn proxy_base_url(&self) -> String {
        format!(
            "{}{}",
            self.public_base_url.trim_end_matches('/'),
            crate::server::PROXY_ROUTE_PREFIX
        )
    }
}

impl Default for AppConfig {
    // mostly here for tests, the real values come from clap
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 8585,
            public_base_url: "http://localhost:8585".to_string(),
            catalog_base_url: "https://kisskh.co".to_string(),
            chrome_executable: None,
            cors_origin: "*".to_string(),
            scraper_concurrency: 5,
            episode_timeout_secs: 25,
            resolve_timeout_secs: 30,
            media_cache_capacity: 0,
            media_cache_ttl_secs: 0,
            bandwidth_cache_capacity: 0,
            bandwidth_cache_ttl_secs: 0,
            download_dir: "downloads".to_string(),
            download_history_capacity: 500,
            download_history_ttl_secs: 86400,
            log_dir: "logs".to_string(),
            sentry_dsn: None,
        }
    }
}
