//! `CloudApi` over a JSON cloud gateway.
//!
//! The gateway fronts the provider SDK and answers with provider-shaped
//! documents (`Reservations`, `Vpcs`, `PriceList`, ...).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::cloud_api::{
    ApiError, ApiResult, BucketDescriptor, CloudApi, CloudApiFactory, CostMonthDescriptor,
    Credentials, InstanceDescriptor, InstanceStatusDescriptor, LaunchSpec, ObjectDescriptor,
    PriceFilter, SubnetDescriptor, VpcDescriptor,
};

/// Longest error body kept in logs and error messages
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct HttpCloudApi {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpCloudApi {
    pub fn new(config: &HttpApiConfig, credentials: Credentials) -> ApiResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("inventory-collector/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("x-access-key-id", &self.credentials.access_key_id)
            .header("x-secret-access-key", &self.credentials.secret_access_key);

        match &self.credentials.session_token {
            Some(token) => request.header("x-session-token", token),
            None => request,
        }
    }

    /// Body of a successful response
    async fn send_raw(&self, request: RequestBuilder) -> ApiResult<Vec<u8>> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        let message = truncate(&String::from_utf8_lossy(&body));
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(message));
        }
        tracing::error!(status = %status, body = %message, "Cloud API error");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let body = self.send_raw(request).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        tracing::debug!(path, "GET");
        self.send(self.client.get(self.url(path))).await
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [{} bytes]", &body[..end], body.len())
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdentityResponse {
    account: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<InstanceDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceStatusResponse {
    #[serde(default)]
    instance_statuses: Vec<InstanceStatusDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesResponse {
    #[serde(default)]
    instances: Vec<InstanceDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcsResponse {
    #[serde(default)]
    vpcs: Vec<VpcDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubnetsResponse {
    #[serde(default)]
    subnets: Vec<SubnetDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketsResponse {
    #[serde(default)]
    buckets: Vec<BucketDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectsResponse {
    #[serde(default)]
    contents: Vec<ObjectDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProductsResponse {
    #[serde(default)]
    price_list: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CostsResponse {
    #[serde(default)]
    months: Vec<CostMonthDescriptor>,
}

/// Price list entries arrive either as JSON documents or as JSON encoded strings
fn decode_price_entry(entry: serde_json::Value) -> ApiResult<serde_json::Value> {
    match entry {
        serde_json::Value::String(raw) => {
            serde_json::from_str(&raw).map_err(|e| ApiError::Parse(e.to_string()))
        }
        other => Ok(other),
    }
}

#[async_trait]
impl CloudApi for HttpCloudApi {
    async fn caller_identity(&self) -> ApiResult<String> {
        let identity: IdentityResponse = self.get("/identity").await?;
        Ok(identity.account)
    }

    async fn describe_instances(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> ApiResult<Vec<InstanceDescriptor>> {
        let mut path = format!("/regions/{}/instances", segment(region));
        if !instance_ids.is_empty() {
            let ids: Vec<String> = instance_ids.iter().map(|id| segment(id)).collect();
            path.push_str(&format!("?ids={}", ids.join(",")));
        }

        let response: InstancesResponse = self.get(&path).await?;
        Ok(response
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .collect())
    }

    async fn describe_instance_status(
        &self,
        region: &str,
        instance_id: &str,
    ) -> ApiResult<Option<InstanceStatusDescriptor>> {
        let path = format!(
            "/regions/{}/instances/{}/status",
            segment(region),
            segment(instance_id)
        );

        match self.get::<InstanceStatusResponse>(&path).await {
            Ok(response) => Ok(response.instance_statuses.into_iter().next()),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn describe_vpcs(&self, region: &str) -> ApiResult<Vec<VpcDescriptor>> {
        let response: VpcsResponse = self
            .get(&format!("/regions/{}/vpcs", segment(region)))
            .await?;
        Ok(response.vpcs)
    }

    async fn describe_subnets(
        &self,
        region: &str,
        vpc_id: &str,
    ) -> ApiResult<Vec<SubnetDescriptor>> {
        let response: SubnetsResponse = self
            .get(&format!(
                "/regions/{}/vpcs/{}/subnets",
                segment(region),
                segment(vpc_id)
            ))
            .await?;
        Ok(response.subnets)
    }

    async fn list_buckets(&self) -> ApiResult<Vec<BucketDescriptor>> {
        let response: BucketsResponse = self.get("/buckets").await?;
        Ok(response.buckets)
    }

    async fn list_objects(&self, bucket: &str) -> ApiResult<Vec<ObjectDescriptor>> {
        let response: ObjectsResponse = self
            .get(&format!("/buckets/{}/objects", segment(bucket)))
            .await?;
        Ok(response.contents)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ApiResult<Vec<u8>> {
        let path = format!("/buckets/{}/objects/{}", segment(bucket), segment(key));
        tracing::debug!(path, "GET");
        self.send_raw(self.client.get(self.url(&path))).await
    }

    async fn run_instance(
        &self,
        region: &str,
        spec: &LaunchSpec,
    ) -> ApiResult<InstanceDescriptor> {
        let path = format!("/regions/{}/instances", segment(region));
        tracing::debug!(path, name = %spec.name, "POST");

        let response: RunInstancesResponse = self
            .send(self.client.post(self.url(&path)).json(spec))
            .await?;
        response
            .instances
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Parse("launch response lists no instance".to_string()))
    }

    async fn get_products(
        &self,
        service_code: &str,
        filters: &[PriceFilter],
    ) -> ApiResult<Vec<serde_json::Value>> {
        tracing::debug!(service_code, "POST /pricing/products");
        let body = serde_json::json!({
            "ServiceCode": service_code,
            "Filters": filters,
            "FormatVersion": "aws_v1",
        });

        let response: ProductsResponse = self
            .send(self.client.post(self.url("/pricing/products")).json(&body))
            .await?;

        response
            .price_list
            .into_iter()
            .map(decode_price_entry)
            .collect()
    }

    async fn monthly_costs(&self, months: u32) -> ApiResult<Vec<CostMonthDescriptor>> {
        let response: CostsResponse = self.get(&format!("/costs?months={months}")).await?;
        Ok(response.months)
    }
}

/// Connects `HttpCloudApi` clients to one gateway
#[derive(Debug, Clone)]
pub struct HttpCloudApiFactory {
    config: HttpApiConfig,
}

impl HttpCloudApiFactory {
    pub fn new(config: HttpApiConfig) -> Self {
        Self { config }
    }
}

impl CloudApiFactory for HttpCloudApiFactory {
    fn connect(&self, credentials: &Credentials) -> ApiResult<Arc<dyn CloudApi>> {
        Ok(Arc::new(HttpCloudApi::new(&self.config, credentials.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpCloudApi {
        HttpCloudApi::new(
            &HttpApiConfig {
                base_url: format!("{}/", server.uri()),
                timeout: Duration::from_secs(5),
            },
            Credentials::new("AKIATEST", "secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_caller_identity_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .and(header("x-access-key-id", "AKIATEST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Account": "123456789012"})))
            .mount(&server)
            .await;

        assert_eq!(api(&server).caller_identity().await.unwrap(), "123456789012");
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .respond_with(ResponseTemplate::new(403).set_body_string("InvalidClientTokenId"))
            .mount(&server)
            .await;

        let err = api(&server).caller_identity().await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_instances_are_flattened_from_reservations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/eu-central-1/instances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Reservations": [
                    {"Instances": [{"InstanceId": "i-1", "InstanceType": "t3.micro"}]},
                    {"Instances": [{"InstanceId": "i-2"}, {"InstanceId": "i-3"}]}
                ]
            })))
            .mount(&server)
            .await;

        let instances = api(&server)
            .describe_instances("eu-central-1", &[])
            .await
            .unwrap();
        let ids: Vec<_> = instances.iter().filter_map(|i| i.instance_id.as_deref()).collect();
        assert_eq!(ids, vec!["i-1", "i-2", "i-3"]);
    }

    #[tokio::test]
    async fn test_instance_filter_is_sent_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/eu-central-1/instances"))
            .and(query_param("ids", "i-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Reservations": []})))
            .expect(1)
            .mount(&server)
            .await;

        let instances = api(&server)
            .describe_instances("eu-central-1", &["i-9".to_string()])
            .await
            .unwrap();
        assert!(instances.is_empty());
    }

    #[tokio::test]
    async fn test_missing_instance_status_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/eu-central-1/instances/i-1/status"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let status = api(&server)
            .describe_instance_status("eu-central-1", "i-1")
            .await
            .unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn test_price_list_accepts_encoded_entries() {
        let server = MockServer::start().await;
        let entry = json!({"terms": {"OnDemand": {"A": {"priceDimensions": {"B": {"pricePerUnit": {"USD": "0.1"}}}}}}});
        Mock::given(method("POST"))
            .and(path("/pricing/products"))
            .and(body_partial_json(json!({"ServiceCode": "AmazonEC2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "PriceList": [entry.to_string(), entry.clone()]
            })))
            .mount(&server)
            .await;

        let products = api(&server)
            .get_products(
                "AmazonEC2",
                &[PriceFilter::term_match("instanceType", "m5.large")],
            )
            .await
            .unwrap();
        assert_eq!(products, vec![entry.clone(), entry]);
    }

    #[tokio::test]
    async fn test_object_body_is_returned_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buckets/assets/objects/reports%2F2024.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"id,total\n1,42\n".to_vec()))
            .mount(&server)
            .await;

        let body = api(&server)
            .get_object("assets", "reports/2024.csv")
            .await
            .unwrap();
        assert_eq!(body, b"id,total\n1,42\n");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buckets/assets/objects/gone.txt"))
            .respond_with(ResponseTemplate::new(404).set_body_string("NoSuchKey"))
            .mount(&server)
            .await;

        let err = api(&server).get_object("assets", "gone.txt").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(message) if message == "NoSuchKey"));
    }

    #[tokio::test]
    async fn test_run_instance_posts_launch_spec() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/regions/eu-central-1/instances"))
            .and(body_partial_json(json!({"Name": "shop", "InstanceType": "t3.micro"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Instances": [{"InstanceId": "i-new", "State": "pending"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = LaunchSpec {
            name: "shop".into(),
            instance_type: "t3.micro".into(),
            image_id: None,
            user_data: "#!/bin/bash".into(),
        };
        let instance = api(&server)
            .run_instance("eu-central-1", &spec)
            .await
            .unwrap();
        assert_eq!(instance.instance_id.as_deref(), Some("i-new"));
        assert!(instance.public_ip_address.is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buckets"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = api(&server).list_buckets().await.unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }
}
