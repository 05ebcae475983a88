mod support;

use anyhow::Result;
use chrono::NaiveDate;
use offerbook::error::SheetError;
use offerbook::models::{Bank, Offer};
use offerbook::sheets::auth::{ServiceAccountKey, ServiceAccountTokens, StaticToken};
use offerbook::sheets::{GoogleSheet, OfferSheet, SheetSync, OFFER_HEADERS};
use serde_json::json;
use support::{sheet_config, TEST_RSA_KEY};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHEET_PATH: &str = "/v4/spreadsheets/sheet123";

fn client(server: &MockServer) -> GoogleSheet {
    GoogleSheet::new("sheet123", Box::new(StaticToken::new("test-token"))).with_base_url(server.uri())
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

async fn mount_metadata(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(SHEET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [
                {"properties": {"sheetId": 0, "title": "Card Offers"}},
                {"properties": {"sheetId": 7, "title": "Log"}}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn append_uses_raw_insert_rows() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/sheet123/values/.+:append$"))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_string_contains("Acme Coffee"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updates": {}})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .append_rows("Card Offers", &[row(&["Amex", "Pat", "1007", "Gold", "Acme Coffee"])])
        .await?;
    Ok(())
}

#[tokio::test]
async fn large_batches_are_chunked() -> Result<()> {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/sheet123/values/.+:append$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{SHEET_PATH}:batchUpdate")))
        .and(body_string_contains("setBasicFilter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"replies": []})))
        .expect(1)
        .mount(&server)
        .await;

    let sheet = client(&server);
    let mut config = sheet_config();
    config.append_chunk_size = 2;
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let offers: Vec<Offer> = (0..5)
        .map(|i| Offer::new(Bank::Citi, format!("Shop {i}"), "5% back", date))
        .collect();

    let written = SheetSync::new(&sheet, &config).append(&offers).await?;
    assert_eq!(written, 5);
    Ok(())
}

#[tokio::test]
async fn error_status_maps_to_api_error() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r":append$"))
        .respond_with(ResponseTemplate::new(403).set_body_string("The caller does not have permission"))
        .mount(&server)
        .await;

    let err = client(&server)
        .append_rows("Card Offers", &[row(&["x"])])
        .await
        .unwrap_err();

    match err.downcast_ref::<SheetError>() {
        Some(SheetError::Api { status, body }) => {
            assert_eq!(*status, 403);
            assert!(body.contains("permission"));
        }
        other => panic!("expected SheetError::Api, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_worksheet_is_created_with_headers() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SHEET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sheets": []})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{SHEET_PATH}:batchUpdate")))
        .and(body_string_contains("addSheet"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "replies": [{"addSheet": {"properties": {"sheetId": 42, "title": "Card Offers"}}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet123/values/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"range": "'Card Offers'!A1:Z1"})))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/sheet123/values/.+"))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_string_contains("Maximum Discount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).ensure_worksheet("Card Offers", &OFFER_HEADERS).await?;
    Ok(())
}

#[tokio::test]
async fn existing_rows_become_dedupe_keys() -> Result<()> {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    let mut header: Vec<serde_json::Value> = OFFER_HEADERS.iter().map(|h| json!(h)).collect();
    header.truncate(6);
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet123/values/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                header,
                ["Amex", "Pat", "1007", "Gold", "Acme Coffee", "15% back"],
                ["Amex", "Pat", "1007", "Gold"]
            ]
        })))
        .mount(&server)
        .await;

    let sheet = client(&server);
    let seen = SheetSync::new(&sheet, &sheet_config()).existing_keys().await?;

    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let offer = Offer::new(Bank::Amex, "acme  coffee", "15% BACK", date);
    assert_eq!(seen.len(), 1);
    assert!(seen.contains(offer.dedupe_key()));
    Ok(())
}

#[tokio::test]
async fn missing_offers_worksheet_reads_as_no_keys() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SHEET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [{"properties": {"sheetId": 7, "title": "Log"}}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet123/values/.+"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Unable to parse range"))
        .expect(0)
        .mount(&server)
        .await;

    let sheet = client(&server);
    let seen = SheetSync::new(&sheet, &sheet_config()).existing_keys().await?;
    assert!(seen.is_empty());
    Ok(())
}

#[tokio::test]
async fn service_account_token_is_fetched_once_and_reused() -> Result<()> {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{SHEET_PATH}:batchUpdate")))
        .and(header("authorization", "Bearer ya29.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"replies": []})))
        .expect(2)
        .mount(&server)
        .await;

    let key_json = json!({
        "type": "service_account",
        "client_email": "offerbook@test.iam.gserviceaccount.com",
        "private_key_id": "abc123",
        "private_key": TEST_RSA_KEY,
        "token_uri": format!("{}/token", server.uri()),
    });
    let key = ServiceAccountKey::from_json(&key_json.to_string())?;
    let sheet = GoogleSheet::new("sheet123", Box::new(ServiceAccountTokens::new(key)))
        .with_base_url(server.uri());

    sheet.reset_filter("Card Offers", OFFER_HEADERS.len()).await?;
    sheet.delete_rows("Card Offers", &[3, 5]).await?;
    Ok(())
}

#[tokio::test]
async fn rejected_token_exchange_is_auth_error() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let key = ServiceAccountKey::from_json(
        &json!({
            "client_email": "offerbook@test.iam.gserviceaccount.com",
            "private_key": TEST_RSA_KEY,
        })
        .to_string(),
    )?
    .with_token_uri(format!("{}/token", server.uri()));
    let sheet = GoogleSheet::new("sheet123", Box::new(ServiceAccountTokens::new(key)))
        .with_base_url(server.uri());

    let err = sheet.read_rows("Card Offers").await.unwrap_err();
    match err.downcast_ref::<SheetError>() {
        Some(SheetError::Auth(message)) => assert!(message.contains("invalid_grant")),
        other => panic!("expected SheetError::Auth, got {other:?}"),
    }
    Ok(())
}
