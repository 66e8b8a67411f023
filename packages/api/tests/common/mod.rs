#![allow(dead_code)]

use agroscan_api::axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use agroscan_api::state::{AppState, State};
use agroscan_api::store::{PoolOptions, ScanStore};
use agroscan_api::token::TokenIssuer;
use agroscan_vision::{
    Classifier, DecisionPolicy, ImageTensor, LoadPolicy, ModelError, ModelLoadError, ModelLoader,
    ModelManifest, ModelSource,
};
use http_body_util::BodyExt;
use std::io::Cursor;
use std::sync::Arc;

pub const BOUNDARY: &str = "agroscan-test-boundary";

/// Index order of the default manifest.
pub const ANTHRACNOSE: usize = 0;
pub const NON_TEA: usize = 1;
pub const HEALTHY: usize = 6;

pub struct FixedClassifier(pub Vec<f32>);

impl Classifier for FixedClassifier {
    fn infer(&self, _image: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        Ok(self.0.clone())
    }
}

pub struct StubSource {
    pub scores: Option<Vec<f32>>,
}

impl ModelSource for StubSource {
    fn describe(&self) -> String {
        "stub://model".to_string()
    }

    fn load(&self) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        match &self.scores {
            Some(scores) => Ok(Arc::new(FixedClassifier(scores.clone()))),
            None => Err(ModelLoadError::new(self.describe(), "no such file")),
        }
    }
}

/// Probability vector over the nine default labels with `top` at `index`
/// and the remainder spread evenly.
pub fn scores(index: usize, top: f32) -> Vec<f32> {
    let rest = (1.0 - top) / 8.0;
    (0..9).map(|i| if i == index { top } else { rest }).collect()
}

pub async fn memory_store() -> ScanStore {
    let pool = PoolOptions {
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let store = ScanStore::connect("sqlite::memory:", &pool)
        .await
        .expect("in-memory sqlite");
    store.ensure_schema().await.expect("schema");
    store
}

/// State whose model always answers `scores`, already loaded.
pub async fn state_with_scores(scores: Vec<f32>) -> AppState {
    let loader = ModelLoader::new(
        Arc::new(StubSource {
            scores: Some(scores),
        }),
        LoadPolicy::Eager,
        9,
    );
    loader.load().await.expect("stub load");
    build_state(loader, None).await
}

/// Loaded state that accepts request bodies of at most `limit` bytes.
pub async fn state_with_upload_limit(scores: Vec<f32>, limit: usize) -> AppState {
    let loader = ModelLoader::new(
        Arc::new(StubSource {
            scores: Some(scores),
        }),
        LoadPolicy::Eager,
        9,
    );
    loader.load().await.expect("stub load");
    build_state(loader, Some(limit)).await
}

/// State whose model never became ready.
pub async fn state_without_model() -> AppState {
    let loader = ModelLoader::new(Arc::new(StubSource { scores: None }), LoadPolicy::Eager, 9);
    assert!(loader.load().await.is_err());
    build_state(loader, None).await
}

async fn build_state(loader: ModelLoader, upload_limit: Option<usize>) -> AppState {
    let manifest = ModelManifest::default();
    let policy = DecisionPolicy::from_manifest(&manifest, 0.70).expect("policy");
    let state = State::new(
        memory_store().await,
        Arc::new(loader),
        &manifest,
        policy,
        TokenIssuer::new(b"test-secret"),
    );
    Arc::new(match upload_limit {
        Some(limit) => state.with_max_upload_bytes(limit),
        None => state,
    })
}

/// Drops the `scans` table so every scan write fails at the database.
pub async fn break_scans_table(state: &AppState) {
    use agroscan_api::sea_orm::ConnectionTrait;
    state
        .store
        .connection()
        .execute_unprepared("DROP TABLE scans")
        .await
        .expect("drop scans");
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(32, 24, image::Rgb([40, 160, 60]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Hand-built multipart body. `file` is sent as an upload, the rest as text.
pub fn multipart_request(file: Option<&[u8]>, user_email: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(data) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"leaf.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(email) = user_email {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"user_email\"\r\n\r\n{email}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, value: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn router(state: &AppState) -> Router {
    agroscan_api::construct_router(state.clone())
}
