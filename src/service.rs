use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use actix_files::Files;
use actix_multipart::Multipart;
use actix_rt::System;
use actix_web::App;
use actix_web::Error as ActixError;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::error::BlockingError;
use actix_web::http::header;
use actix_web::middleware;
use actix_web::web;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use futures::StreamExt;
use futures::TryStreamExt;
use rustls::NoClientAuth;
use rustls::ServerConfig;
use serde::Deserialize;
use serde::de::Deserializer;
use serde::de::MapAccess;
use serde::de::Visitor;

use super::application;
use super::compositor::Compositor;
use super::error::ComposeError;
use super::loader;
use super::loader::OverlayAsset;
use super::surface::OpacityLevel;


const MAX_UPLOAD_SIZE: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct ServerOptions {
    host: String,
    workers: usize,
    max_tasks: usize,
    max_upload: usize,
    compress: bool,
    web_root: PathBuf,
    overlay_path: Option<PathBuf>,
    tls: Option<(PathBuf, PathBuf)>,
    compositor: Compositor,
}

impl Default for ServerOptions {

    fn default() -> Self {
        ServerOptions {
            host: String::from("127.0.0.1:8080"),
            workers: num_cpus::get(),
            max_tasks: 16,
            max_upload: MAX_UPLOAD_SIZE,
            compress: false,
            web_root: application::default_web_root(),
            overlay_path: None,
            tls: None,
            compositor: Compositor::default(),
        }
    }
}

impl ServerOptions {

    pub fn set_host(&mut self, host: &str) {
        self.host = String::from(host);
    }

    pub fn set_workers(&mut self, num: usize) {
        self.workers = num;
    }

    pub fn set_max_tasks(&mut self, num: usize) {
        self.max_tasks = num;
    }

    pub fn set_max_upload(&mut self, bytes: usize) {
        self.max_upload = bytes;
    }

    pub fn set_compress(&mut self, compress: bool) {
        self.compress = compress;
    }

    pub fn set_web_root(&mut self, path: &str) {
        self.web_root = PathBuf::from(path);
    }

    pub fn set_overlay_path(&mut self, path: &str) {
        self.overlay_path = Some(PathBuf::from(path));
    }

    pub fn set_tls(&mut self, cert: &str, key: &str) {
        self.tls = Some((PathBuf::from(cert), PathBuf::from(key)));
    }

    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    /// Explicit overlay path, or `overlay.png` inside the web root so the
    /// offline cache and the compositor see the same file.
    pub fn overlay_path(&self) -> PathBuf {
        match &self.overlay_path {
            Some(p) => p.clone(),
            None => self.web_root.join(loader::DEFAULT_OVERLAY_FILE),
        }
    }
}


pub struct ComposeService {
    options: ServerOptions,
    overlay: &'static OverlayAsset,
    working: AtomicUsize,
}

impl ComposeService {

    pub fn new(options: ServerOptions) -> Self {
        loader::configure_overlay_path(options.overlay_path());
        Self::with_overlay(options, loader::fixed_overlay())
    }

    pub fn with_overlay(options: ServerOptions, overlay: &'static OverlayAsset) -> Self {
        ComposeService {
            overlay,
            working: AtomicUsize::new(0),
            options,
        }
    }

    pub fn start(self) -> io::Result<()> {
        if let Err(e) = self.overlay.get() {
            log::error!("{}; composing is unavailable until the overlay asset is fixed", e);
        }
        System::builder()
            .name("ComposeService")
            .build()
            .block_on(run_service(self))
    }
}


/// Query string of `POST /compose`.
#[derive(Debug, Default, PartialEq)]
pub struct ComposeQuery {
    opacity: OpacityLevel,
}

impl<'de> Deserialize<'de> for ComposeQuery {

    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use std::convert::TryFrom;
        use std::fmt;
        use serde::de;

        // query strings carry text, json bodies carry numbers
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawOpacity {
            Number(i64),
            Text(String),
        }

        struct InnerVisitor;

        impl<'de> Visitor<'de> for InnerVisitor {
            type Value = ComposeQuery;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("struct ComposeQuery")
            }

            fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut res = ComposeQuery::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "opacity" => {
                            res.opacity = match map.next_value()? {
                                RawOpacity::Number(n) => OpacityLevel::try_from(n),
                                RawOpacity::Text(s) => s.parse(),
                            }
                            .map_err(<V::Error as de::Error>::custom)?;
                        },
                        _ => {
                            return Err(de::Error::unknown_field(key.as_str(), FIELDS));
                        }
                    }
                }
                Ok(res)
            }
        }

        const FIELDS: &'static [&'static str] = &["opacity"];
        deserializer.deserialize_struct("ComposeQuery", FIELDS, InnerVisitor)
    }
}


fn load_tls_config(cert: &Path, key: &Path) -> io::Result<ServerConfig> {
    use rustls::internal::pemfile::certs;
    use rustls::internal::pemfile::pkcs8_private_keys;

    let invalid = |what: &str| io::Error::new(io::ErrorKind::InvalidData, what.to_string());

    let cert_chain = certs(&mut BufReader::new(File::open(cert)?)).map_err(|_| invalid("bad certificate file"))?;
    let mut keys = pkcs8_private_keys(&mut BufReader::new(File::open(key)?)).map_err(|_| invalid("bad key file"))?;
    if keys.is_empty() {
        return Err(invalid("no pkcs8 private key found"));
    }
    let mut config = ServerConfig::new(NoClientAuth::new());
    config
        .set_single_cert(cert_chain, keys.remove(0))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(config)
}

pub fn routes(cfg: &mut web::ServiceConfig, web_root: PathBuf) {
    cfg.service(
            web::resource("/compose")
                .route(web::post().to(compose))
        )
        .service(
            web::resource("/overlay/info")
                .route(web::get().to(overlay_info))
        )
        .service(
            Files::new("/", web_root).index_file("index.html")
        );
}

async fn run_service(service: ComposeService) -> io::Result<()> {

    const ACTIX_LOG_FORMAT: &'static str = "%a \"%r\" %s \"%{User-Agent}i\" %D";

    let options = service.options.clone();
    let service = web::Data::new(service);
    let web_root = options.web_root.clone();
    let tls = match &options.tls {
        Some((cert, key)) => Some(load_tls_config(cert, key)?),
        None => None,
    };

    macro_rules! bind_and_run {
        ($server:expr) => {{
            let server = $server;
            let server = match tls {
                Some(config) => {
                    log::info!("serving https on {}", options.host);
                    server.bind_rustls(options.host.as_str(), config)?
                },
                None => {
                    log::info!("serving http on {}", options.host);
                    server.bind(options.host.as_str())?
                }
            };
            server
                .workers(options.workers)
                .run()
                .await
        }};
    }

    if options.compress {
        bind_and_run!(HttpServer::new(move || {
            let web_root = web_root.clone();
            App::new()
                .wrap(middleware::Logger::new(ACTIX_LOG_FORMAT))
                .wrap(middleware::Compress::default())
                .app_data(service.clone())
                .configure(move |cfg| routes(cfg, web_root))
        }))
    } else {
        bind_and_run!(HttpServer::new(move || {
            let web_root = web_root.clone();
            App::new()
                .wrap(middleware::Logger::new(ACTIX_LOG_FORMAT))
                .app_data(service.clone())
                .configure(move |cfg| routes(cfg, web_root))
        }))
    }
}


struct Working<'a>(&'a AtomicUsize);

impl<'a> Working<'a> {

    fn enter(counter: &'a AtomicUsize, max: usize) -> Option<Self> {
        if counter.fetch_add(1, Ordering::SeqCst) >= max {
            counter.fetch_sub(1, Ordering::SeqCst);
            None
        } else {
            Some(Working(counter))
        }
    }
}

impl<'a> Drop for Working<'a> {

    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

async fn overlay_info(s: web::Data<ComposeService>) -> HttpResponse {
    match s.overlay.get() {
        Ok(overlay) => HttpResponse::Ok().json(serde_json::json!({
            "width": overlay.width(),
            "height": overlay.height(),
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(error_body(e.to_string())),
    }
}

async fn compose(s: web::Data<ComposeService>, query: web::Query<ComposeQuery>, mut payload: Multipart) -> Result<HttpResponse, ActixError> {

    let _working = match Working::enter(&s.working, s.options.max_tasks) {
        Some(w) => w,
        None => return Ok(HttpResponse::TooManyRequests().finish()),
    };

    let overlay = match s.overlay.get() {
        Ok(overlay) => overlay,
        Err(e) => {
            log::error!("{}", e);
            return Ok(HttpResponse::ServiceUnavailable().json(error_body(format!("overlay unavailable: {}", e))));
        }
    };

    let mut field = match payload.try_next().await? {
        Some(field) => field,
        None => return Ok(HttpResponse::BadRequest().json(error_body(String::from("no image uploaded")))),
    };

    let max_upload = s.options.max_upload;
    let mut buf = BytesMut::with_capacity(64 * 1024);
    while let Some(chunk) = field.next().await {
        let data = chunk?;
        if data.len() + buf.len() > max_upload {
            return Ok(HttpResponse::PayloadTooLarge().finish());
        }
        buf.put(data);
    }

    let compositor = s.options.compositor;
    let opacity = query.into_inner().opacity;
    let r = web::block(move || application::compose_upload(compositor, overlay, opacity, &buf)).await;

    match r {
        Ok(encoded) => {
            let mut builder = HttpResponse::Ok();
            builder.set(header::ContentType::png());
            builder.set(header::ContentDisposition {
                disposition: header::DispositionType::Attachment,
                parameters: vec![
                    header::DispositionParam::Filename(encoded.filename.clone())
                ]
            });
            Ok(builder.body(Bytes::from(encoded.bytes)))
        },
        Err(BlockingError::Error(ComposeError::Decode(e))) => {
            log::warn!("rejected upload: {}", e);
            Ok(HttpResponse::BadRequest().json(error_body(e.to_string())))
        },
        Err(BlockingError::Error(e)) => {
            log::error!("compose failed: {}", e);
            Ok(HttpResponse::InternalServerError().json(error_body(e.to_string())))
        },
        Err(BlockingError::Canceled) => {
            Ok(HttpResponse::InternalServerError().json(error_body(String::from("compose canceled"))))
        },
    }
}
