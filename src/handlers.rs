// src/handlers.rs
use crate::{AppState, errors::PipelineError, models::*};
use actix_files::NamedFile;
use actix_multipart::{Field, Multipart};
use actix_web::{Error, HttpResponse, web};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use log::info;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/generate-campaign", web::post().to(generate_campaign))
            .route("/campaigns", web::get().to(list_campaigns))
            .route("/campaign/{campaign_id}", web::get().to(get_campaign))
            .route(
                "/campaign/{campaign_id}/images",
                web::get().to(list_campaign_images),
            )
            .route(
                "/campaign/{campaign_id}/download/{product_key}/{filename}",
                web::get().to(download_campaign_image),
            )
            .route(
                "/campaign/{campaign_id}/metrics",
                web::get().to(get_campaign_metrics),
            )
            .route("/metrics", web::get().to(get_all_metrics))
            .route("/assets/info", web::get().to(get_assets_info))
            .route("/assets/upload", web::post().to(upload_asset)),
    );
}

pub async fn generate_campaign(
    body: web::Json<CampaignBrief>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let campaign_id = data.orchestrator.start(body.into_inner())?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "accepted",
        "campaign_id": campaign_id,
        "message": format!("Campaign {} is being processed", campaign_id)
    })))
}

pub async fn get_campaign(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let campaign_id = path.into_inner();

    let record = data
        .orchestrator
        .campaigns()
        .snapshot(&campaign_id)
        .ok_or_else(|| PipelineError::NotFound(format!("Campaign not found: {}", campaign_id)))?;

    Ok(HttpResponse::Ok().json(&record))
}

pub async fn list_campaigns(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let campaign_ids = data.assets.list_campaign_ids().await?;
    Ok(HttpResponse::Ok().json(campaign_ids))
}

pub async fn list_campaign_images(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let campaign_id = path.into_inner();
    let images = data.assets.list_campaign_images(&campaign_id).await?;
    let total_images: usize = images.values().map(Vec::len).sum();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "campaign_id": campaign_id,
        "images": images,
        "total_images": total_images
    })))
}

pub async fn download_campaign_image(
    path: web::Path<(String, String, String)>,
    data: web::Data<AppState>,
) -> Result<NamedFile, Error> {
    let (campaign_id, product_key, filename) = path.into_inner();

    let file = data
        .assets
        .creative_file(&campaign_id, &product_key, &filename)
        .await?;

    Ok(NamedFile::open_async(file)
        .await
        .map_err(PipelineError::from)?)
}

pub async fn get_all_metrics(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let snapshots = data.metrics.list_all().await?;
    Ok(HttpResponse::Ok().json(snapshots))
}

pub async fn get_campaign_metrics(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let snapshot = data.metrics.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(&snapshot))
}

pub async fn get_assets_info(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let info = data.assets.asset_info().await?;
    Ok(HttpResponse::Ok().json(&info))
}

struct UploadedFile {
    filename: String,
    content_type: String,
    data: BytesMut,
}

pub async fn upload_asset(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut product_name = None;
    let mut upload = None;

    while let Some(mut field) = payload.try_next().await? {
        let field_name = field.name().to_string();
        match field_name.as_str() {
            "product_name" => {
                let raw = read_field(&mut field, data.max_upload_bytes).await?;
                let name = String::from_utf8(raw.to_vec()).map_err(|_| {
                    PipelineError::Validation("product_name must be valid UTF-8".to_string())
                })?;
                product_name = Some(name);
            }
            "file" => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .ok_or_else(|| PipelineError::Validation("No filename provided".to_string()))?
                    .to_string();

                let content_type = field
                    .content_type()
                    .map(|ct| ct.essence_str().to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                let bytes = read_field(&mut field, data.max_upload_bytes).await?;
                upload = Some(UploadedFile {
                    filename,
                    content_type,
                    data: bytes,
                });
            }
            // Unknown parts are drained and ignored
            _ => while field.try_next().await?.is_some() {},
        }
    }

    let product_name = product_name
        .ok_or_else(|| PipelineError::Validation("Missing product_name field".to_string()))?;
    let upload =
        upload.ok_or_else(|| PipelineError::Validation("Missing file field".to_string()))?;

    let (width, height) = data.compositor.validate_image(&upload.data)?;

    let stored = data
        .assets
        .store_upload(
            &product_name,
            &upload.filename,
            &upload.content_type,
            &upload.data,
        )
        .await?;

    info!(
        "Uploaded {}x{} asset {} for {}",
        width, height, stored.filename, product_name
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "product_name": product_name.trim(),
        "asset_directory": data.assets.product_dir(product_name.trim()).display().to_string(),
        "file_info": stored
    })))
}

async fn read_field(field: &mut Field, limit: usize) -> Result<BytesMut, Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.try_next().await? {
        if buf.len() + chunk.len() > limit {
            return Err(PipelineError::Validation(format!(
                "Upload exceeds the {} byte limit",
                limit
            ))
            .into());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use serde_json::{Value, json};
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    const BOUNDARY: &str = "----pipelinetestboundary";

    fn state(dir: &TempDir) -> AppState {
        let config = AppConfig {
            assets_dir: dir.path().join("assets"),
            output_dir: dir.path().join("output"),
            metrics_dir: dir.path().join("metrics"),
            max_upload_bytes: 1024 * 1024,
            ..AppConfig::default()
        };
        AppState::from_config(&config)
    }

    fn brief_json(names: &[&str]) -> Value {
        json!({
            "products": names
                .iter()
                .map(|n| json!({ "name": n, "description": format!("{} description", n) }))
                .collect::<Vec<_>>(),
            "target_region": "US",
            "target_audience": "Young adults aged 18-35",
            "campaign_message": "Stay fresh this summer with our new drinks"
        })
    }

    fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(32, 32, Rgb(color))
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn multipart_body(product_name: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"product_name\"\r\n\r\n{product_name}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/v1/assets/upload")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_single_product_brief_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/generate-campaign")
            .set_json(brief_json(&["Solo"]))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.orchestrator.campaigns().len(), 0);
    }

    #[actix_web::test]
    async fn test_unknown_campaign_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(&dir)))
                .configure(routes),
        )
        .await;

        for uri in [
            "/api/v1/campaign/missing",
            "/api/v1/campaign/missing/images",
            "/api/v1/campaign/missing/metrics",
            "/api/v1/campaign/missing/download/cola/cola_1x1.jpg",
        ] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_campaign_lifecycle_over_http() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(&dir)))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/generate-campaign")
            .set_json(brief_json(&["Cola", "Green Tea"]))
            .to_request();
        let accepted: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(accepted["status"], "accepted");
        let campaign_id = accepted["campaign_id"].as_str().unwrap().to_string();

        let mut record = Value::Null;
        for _ in 0..600 {
            let req = test::TestRequest::get()
                .uri(&format!("/api/v1/campaign/{}", campaign_id))
                .to_request();
            record = test::call_and_read_body_json(&app, req).await;
            if record["status"] != "processing" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(record["status"], "completed");
        assert_eq!(record["creatives"]["Cola"]["asset_status"], "generated");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/campaign/{}/images", campaign_id))
            .to_request();
        let images: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(images["total_images"], 6);
        assert_eq!(images["images"]["green_tea"].as_array().unwrap().len(), 3);

        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/campaign/{}/download/green_tea/green_tea_16x9.jpg",
                campaign_id
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/campaign/{}/metrics", campaign_id))
            .to_request();
        let metrics: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(metrics["final_status"], "completed");
        assert_eq!(metrics["summary"]["total_creatives_generated"], 6);

        let req = test::TestRequest::get().uri("/api/v1/campaigns").to_request();
        let ids: Vec<String> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ids, vec![campaign_id.clone()]);

        let req = test::TestRequest::get().uri("/api/v1/metrics").to_request();
        let all: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(all.len(), 1);
    }

    #[actix_web::test]
    async fn test_upload_stores_asset() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(&dir)))
                .configure(routes),
        )
        .await;

        let body = multipart_body("Green Tea", "hero.png", "image/png", &png_bytes([10, 200, 10]));
        let resp: Value = test::call_and_read_body_json(&app, upload_request(body).to_request()).await;

        assert_eq!(resp["status"], "success");
        assert_eq!(resp["product_name"], "Green Tea");
        assert_eq!(resp["file_info"]["filename"], "hero.png");
        assert!(dir.path().join("assets/green_tea/hero.png").exists());

        let req = test::TestRequest::get().uri("/api/v1/assets/info").to_request();
        let info: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(info["products_with_assets"][0]["product"], "green_tea");
        assert_eq!(info["products_with_assets"][0]["asset_count"], 1);
    }

    #[actix_web::test]
    async fn test_upload_rejects_non_image() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(&dir)))
                .configure(routes),
        )
        .await;

        let body = multipart_body("Cola", "hero.png", "image/png", b"definitely not a png");
        let resp = test::call_service(&app, upload_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = multipart_body("Cola", "notes.txt", "text/plain", &png_bytes([1, 2, 3]));
        let resp = test::call_service(&app, upload_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert!(!dir.path().join("assets/cola").exists());
    }
}
