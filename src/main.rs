use tracing::{error, info};

use classdrop::{Backend, ClassListScreen, Config};

const CONFIG_PATH: &str = "classdrop.toml";

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = classdrop::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        classdrop::logging::init_console_only(&config.logging.level);
    }

    info!("classdrop - classroom file sharing");
    info!("Document store at {}", config.backend.database_url);

    let backend = match Backend::connect(&config).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to open backend: {e}");
            std::process::exit(1);
        }
    };

    let mut screen = ClassListScreen::new(backend);
    screen.mount();

    loop {
        let updated = tokio::select! {
            updated = screen.next_update() => updated,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                false
            }
        };
        if !updated {
            break;
        }

        for row in screen.rows() {
            info!("{}: {}", row.title, row.subtitle);
        }
        info!("{} class(es)", screen.classes().len());
    }

    screen.unmount();
}
