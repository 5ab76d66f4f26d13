pub mod subscription;

pub use subscription::{
    ensure_converted, filter_proxies, ingest_subscription, parse_subscription_body,
    refresh_index, run_subscription_script, SUBSCRIBE_HANDLER,
};
