
mod error;
mod surface;
mod loader;
mod compositor;
mod export;
mod session;
mod application;
#[cfg(feature = "service")]
mod service;

use std::process;
use std::time::Instant;

use clap::App;
use clap::Arg;
use clap::ArgMatches;
use clap::SubCommand;

use error::ComposeError;
use surface::OpacityLevel;


const VERSION: &'static str = env!("CARGO_PKG_VERSION");
const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");


fn filter_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("filter")
        .long("filter")
        .help("filter used to stretch the overlay, can be \"nearest\", \"triangle\", \"gaussian\", \"catmullrom\", \"lanczos3\"; default is \"triangle\"")
        .takes_value(true)
}

fn overlay_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("overlay")
        .long("overlay")
        .help("overlay image, default is web/overlay.png next to the executable")
        .takes_value(true)
}

fn main() {

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app =
        App::new("overlay compositor")
        .version(VERSION)
        .author(AUTHORS)
        .subcommand(
            SubCommand::with_name("compose")
            .arg(
                Arg::with_name("input")
                .short("i")
                .long("input")
                .help("image to put the overlay on")
                .takes_value(true)
                .required(true)
            )
            .arg(
                Arg::with_name("output_dir")
                .short("o")
                .long("output_dir")
                .help("output folder, default is the current folder")
                .takes_value(true)
            )
            .arg(
                Arg::with_name("opacity")
                .long("opacity")
                .help("overlay opacity, from 0 to 100, default is 100")
                .takes_value(true)
            )
            .arg(overlay_arg())
            .arg(filter_arg())
        )
        .subcommand(
            SubCommand::with_name("serve")
            .arg(
                Arg::with_name("host")
                .long("host")
                .help("listen address, default is 127.0.0.1:8080")
                .takes_value(true)
            )
            .arg(
                Arg::with_name("web_root")
                .long("web_root")
                .help("folder with index.html, service-worker.js and overlay.png")
                .takes_value(true)
            )
            .arg(
                Arg::with_name("workers")
                .short("t")
                .long("workers")
                .help("http worker threads, default is the cpu count")
                .takes_value(true)
            )
            .arg(
                Arg::with_name("max_tasks")
                .long("max_tasks")
                .help("compose requests allowed in flight, default is 16")
                .takes_value(true)
            )
            .arg(
                Arg::with_name("compress")
                .long("compress")
                .help("compress responses")
                .takes_value(false)
            )
            .arg(
                Arg::with_name("tls_cert")
                .long("tls_cert")
                .help("pem certificate chain; service workers need https outside localhost")
                .takes_value(true)
                .requires("tls_key")
            )
            .arg(
                Arg::with_name("tls_key")
                .long("tls_key")
                .help("pem pkcs8 private key")
                .takes_value(true)
                .requires("tls_cert")
            )
            .arg(overlay_arg())
            .arg(filter_arg())
        );

    let matches = app.get_matches();
    let (name, args) = matches.subcommand();
    let args = if let Some(v) = args {
        v
    } else {
        println!("{}", matches.usage());
        return;
    };
    let code = match name {
        "compose" => compose(args),
        "serve" => serve(args),
        _ => 0,
    };
    process::exit(code);
}

fn compose(args: &ArgMatches) -> i32 {
    let options = {
        let mut options = application::AppOptions::default();
        if let Some(input) = args.value_of("input") {
            options.set_input_file(input);
        }
        if let Some(dir) = args.value_of("output_dir") {
            options.set_output_folder(dir);
        }
        if let Some(path) = args.value_of("overlay") {
            options.set_overlay_path(path);
        }
        if let Some(filter) = args.value_of("filter") {
            if !options.compositor_mut().set_filter(filter) {
                log::warn!("unknown filter {:?}, keeping triangle", filter);
            }
        }
        if let Some(opacity) = args.value_of("opacity") {
            match opacity.parse::<OpacityLevel>() {
                Ok(o) => options.set_opacity(o),
                Err(e) => {
                    log::error!("{}", e);
                    return 1;
                }
            }
        }
        options
    };

    let app = application::Application::new(options);
    let time = Instant::now();
    match app.compose_one() {
        Ok(path) => {
            log::info!("> saved {} in {}ms", path.display(), time.elapsed().as_millis());
            0
        },
        Err(ComposeError::AssetLoad(e)) => {
            log::error!("{}; the overlay tool cannot work without it", e);
            2
        },
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}

#[cfg(feature = "service")]
fn serve(args: &ArgMatches) -> i32 {
    let mut options = service::ServerOptions::default();
    if let Some(host) = args.value_of("host") {
        options.set_host(host);
    }
    if let Some(root) = args.value_of("web_root") {
        options.set_web_root(root);
    }
    if let Some(path) = args.value_of("overlay") {
        options.set_overlay_path(path);
    }
    if let Some(workers) = args.value_of("workers") {
        if let Ok(workers) = workers.parse() {
            options.set_workers(workers);
        }
    }
    if let Some(max_tasks) = args.value_of("max_tasks") {
        if let Ok(max_tasks) = max_tasks.parse() {
            options.set_max_tasks(max_tasks);
        }
    }
    if args.is_present("compress") {
        options.set_compress(true);
    }
    if let (Some(cert), Some(key)) = (args.value_of("tls_cert"), args.value_of("tls_key")) {
        options.set_tls(cert, key);
    }
    if let Some(filter) = args.value_of("filter") {
        if !options.compositor_mut().set_filter(filter) {
            log::warn!("unknown filter {:?}, keeping triangle", filter);
        }
    }
    match service::ComposeService::new(options).start() {
        Ok(()) => 0,
        Err(e) => {
            log::error!("service stopped: {}", e);
            1
        }
    }
}

#[cfg(not(feature = "service"))]
fn serve(_args: &ArgMatches) -> i32 {
    log::error!("built without the \"service\" feature");
    1
}
