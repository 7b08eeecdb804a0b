use std::sync::Arc;

use spot_remote::service::{self, Context};
use spot_remote::spotify::SurfAccounts;
use spot_remote::{store, CONFIG};

#[async_std::main]
async fn main() -> spot_remote::Result<()> {
    spot_remote::load_dotenv();
    CONFIG.initialize()?;

    let store = store::connect().await?;
    let ctx = Context::new(store, Arc::new(SurfAccounts::new()));
    service::start(ctx).await
}
