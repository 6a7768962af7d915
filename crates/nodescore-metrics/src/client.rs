//! Prometheus HTTP query client.
//!
//! Issues instant queries against `/api/v1/query` and decodes a single
//! scalar series out of the response. One client is built per provider
//! and shared across scheduling cycles.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Full};
use hyper::Response;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tracing::{debug, warn};
use url::form_urlencoded;

use nodescore_core::{Context, Interrupted};

use crate::error::{MetricsError, MetricsResult};

const USER_AGENT: &str = "nodescore/0.1";
const QUERY_PATH: &str = "/api/v1/query";
const READY_PATH: &str = "/-/ready";

/// One value read from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Series labels; empty for scalar results.
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    /// Evaluation time, unix seconds.
    pub timestamp: f64,
}

/// Client for a single Prometheus server.
pub struct PrometheusClient {
    address: String,
    query_uri: Uri,
    ready_uri: Uri,
    http: Client<HttpConnector, Full<Bytes>>,
    query_timeout: Duration,
}

impl fmt::Debug for PrometheusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusClient")
            .field("address", &self.address)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl PrometheusClient {
    /// Build a client and probe the backend's readiness endpoint.
    ///
    /// Fails with [`MetricsError::BackendUnavailable`] when the address
    /// is malformed, not `http`, or the probe does not succeed within
    /// `query_timeout`.
    pub async fn connect(address: &str, query_timeout: Duration) -> MetricsResult<Self> {
        let client = Self::new(address, query_timeout)?;

        match tokio::time::timeout(query_timeout, client.probe()).await {
            Ok(Ok(())) => {
                debug!(address = %client.address, "prometheus backend ready");
                Ok(client)
            }
            Ok(Err(reason)) => Err(client.unavailable(reason)),
            Err(_) => Err(client.unavailable(format!(
                "readiness probe timed out after {query_timeout:?}"
            ))),
        }
    }

    fn new(address: &str, query_timeout: Duration) -> MetricsResult<Self> {
        let base = address.trim().trim_end_matches('/');
        let unavailable = |reason: String| MetricsError::BackendUnavailable {
            address: base.to_string(),
            reason,
        };

        let query_uri: Uri = format!("{base}{QUERY_PATH}")
            .parse()
            .map_err(|e| unavailable(format!("invalid address: {e}")))?;
        match query_uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(unavailable(format!("unsupported scheme {other:?}"))),
            None => return Err(unavailable("address has no scheme".to_string())),
        }
        if query_uri.host().is_none_or(str::is_empty) {
            return Err(unavailable("address has no host".to_string()));
        }
        let ready_uri: Uri = format!("{base}{READY_PATH}")
            .parse()
            .map_err(|e| unavailable(format!("invalid address: {e}")))?;

        Ok(Self {
            address: base.to_string(),
            query_uri,
            ready_uri,
            http: Client::builder(TokioExecutor::new()).build_http(),
            query_timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Run an instant query and return its single series.
    ///
    /// Bounded by `ctx` and by the client's query timeout. Backend
    /// warnings are logged, never returned as errors.
    pub async fn query(&self, ctx: &Context, query: &str) -> MetricsResult<Sample> {
        let ctx = ctx.with_timeout(self.query_timeout);
        let started = Instant::now();

        match ctx.run(self.execute(query)).await {
            Ok(result) => result,
            Err(Interrupted::DeadlineExceeded) => Err(MetricsError::Timeout {
                elapsed: started.elapsed(),
            }),
            Err(Interrupted::Cancelled) => Err(MetricsError::Cancelled),
        }
    }

    async fn execute(&self, query: &str) -> MetricsResult<Sample> {
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("query", query)
            .append_pair("time", &evaluation_time())
            .finish();

        let req = Request::builder()
            .method(Method::POST)
            .uri(self.query_uri.clone())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::USER_AGENT, USER_AGENT)
            .body(Full::new(Bytes::from(form)))
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        debug!(%query, "issuing prometheus query");
        let resp: Response<Incoming> = self
            .http
            .request(req)
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?
            .to_bytes();

        decode_response(status, &body)
    }

    async fn probe(&self) -> Result<(), String> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(self.ready_uri.clone())
            .header(header::USER_AGENT, USER_AGENT)
            .body(Full::new(Bytes::new()))
            .map_err(|e| e.to_string())?;

        let resp = self.http.request(req).await.map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("readiness probe returned {}", resp.status()))
        }
    }

    fn unavailable(&self, reason: String) -> MetricsError {
        MetricsError::BackendUnavailable {
            address: self.address.clone(),
            reason,
        }
    }
}

// ── Wire format ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    data: Option<QueryData>,
    error_type: Option<String>,
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Scalar(SamplePair),
    Matrix(Vec<serde_json::Value>),
    #[serde(rename = "string")]
    Text(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: SamplePair,
}

/// `[<unix seconds>, "<value>"]`
#[derive(Debug, Deserialize)]
struct SamplePair(f64, String);

fn decode_response(status: StatusCode, body: &[u8]) -> MetricsResult<Sample> {
    let resp: ApiResponse = match serde_json::from_slice(body) {
        Ok(resp) => resp,
        Err(_) if !status.is_success() => {
            return Err(MetricsError::Query {
                error_type: format!("http_{}", status.as_u16()),
                message: String::from_utf8_lossy(body).trim().to_string(),
            });
        }
        Err(e) => return Err(MetricsError::Decode(e.to_string())),
    };

    if !resp.warnings.is_empty() {
        warn!(warnings = ?resp.warnings, "prometheus returned warnings");
    }

    if resp.status != "success" {
        return Err(MetricsError::Query {
            error_type: resp.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: resp.error.unwrap_or_default(),
        });
    }

    let data = resp
        .data
        .ok_or_else(|| MetricsError::Decode("response has no data".to_string()))?;

    match data {
        QueryData::Vector(mut series) => {
            if series.len() != 1 {
                return Err(MetricsError::Shape {
                    result_type: "vector",
                    series: series.len(),
                });
            }
            let sample = series.remove(0);
            into_sample(sample.metric, sample.value)
        }
        QueryData::Scalar(pair) => into_sample(BTreeMap::new(), pair),
        QueryData::Matrix(series) => Err(MetricsError::Shape {
            result_type: "matrix",
            series: series.len(),
        }),
        QueryData::Text(_) => Err(MetricsError::Shape {
            result_type: "string",
            series: 0,
        }),
    }
}

fn into_sample(labels: BTreeMap<String, String>, pair: SamplePair) -> MetricsResult<Sample> {
    let SamplePair(timestamp, raw) = pair;
    Ok(Sample {
        labels,
        value: parse_sample_value(&raw)?,
        timestamp,
    })
}

fn parse_sample_value(raw: &str) -> MetricsResult<f64> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse()
            .map_err(|_| MetricsError::Decode(format!("invalid sample value {raw:?}"))),
    }
}

/// Unix seconds with millisecond precision.
fn evaluation_time() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:.3}", now.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> MetricsResult<Sample> {
        decode_response(StatusCode::OK, body.as_bytes())
    }

    #[test]
    fn decodes_single_vector_series() {
        let sample = decode(
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"instance":"10.0.0.5:9100"},"value":[1700000000.5,"12345"]}]}}"#,
        )
        .unwrap();

        assert_eq!(sample.value, 12345.0);
        assert_eq!(sample.timestamp, 1700000000.5);
        assert_eq!(sample.labels.get("instance").unwrap(), "10.0.0.5:9100");
    }

    #[test]
    fn decodes_scalar() {
        let sample = decode(
            r#"{"status":"success","data":{"resultType":"scalar","result":[1700000000,"2.5"]}}"#,
        )
        .unwrap();
        assert_eq!(sample.value, 2.5);
        assert!(sample.labels.is_empty());
    }

    #[test]
    fn empty_vector_is_shape_error() {
        let err = decode(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#)
            .unwrap_err();
        assert!(matches!(err, MetricsError::Shape { result_type: "vector", series: 0 }));
    }

    #[test]
    fn multiple_series_is_shape_error() {
        let err = decode(
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"device":"eth0"},"value":[1,"1"]},
                {"metric":{"device":"eth1"},"value":[1,"2"]}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetricsError::Shape { series: 2, .. }));
        assert_eq!(err.kind(), "shape_error");
    }

    #[test]
    fn matrix_is_shape_error() {
        let err = decode(
            r#"{"status":"success","data":{"resultType":"matrix","result":[
                {"metric":{},"values":[[1,"1"],[2,"2"]]}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetricsError::Shape { result_type: "matrix", series: 1 }));
    }

    #[test]
    fn backend_error_is_query_error() {
        let err = decode_response(
            StatusCode::BAD_REQUEST,
            br#"{"status":"error","errorType":"bad_data","error":"parse error at char 5"}"#,
        )
        .unwrap_err();

        match err {
            MetricsError::Query { error_type, message } => {
                assert_eq!(error_type, "bad_data");
                assert_eq!(message, "parse error at char 5");
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_failure_keeps_status() {
        let err = decode_response(StatusCode::BAD_GATEWAY, b"upstream down").unwrap_err();
        match err {
            MetricsError::Query { error_type, message } => {
                assert_eq!(error_type, "http_502");
                assert_eq!(message, "upstream down");
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_success_is_decode_error() {
        let err = decode("<html>").unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn warnings_do_not_fail_the_query() {
        let sample = decode(
            r#"{"status":"success","warnings":["partial data"],"data":{"resultType":"scalar","result":[1,"7"]}}"#,
        )
        .unwrap();
        assert_eq!(sample.value, 7.0);
    }

    #[test]
    fn special_float_values() {
        assert!(parse_sample_value("NaN").unwrap().is_nan());
        assert_eq!(parse_sample_value("+Inf").unwrap(), f64::INFINITY);
        assert_eq!(parse_sample_value("-Inf").unwrap(), f64::NEG_INFINITY);
        assert!(parse_sample_value("twelve").is_err());
    }

    #[test]
    fn rejects_unsupported_addresses() {
        for address in ["https://prom:9090", "prom:9090", "not a url", "http://"] {
            let err = PrometheusClient::new(address, Duration::from_secs(1)).unwrap_err();
            assert_eq!(err.kind(), "backend_unavailable", "address {address}");
        }
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = PrometheusClient::new("http://prom:9090/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.address(), "http://prom:9090");
        assert_eq!(client.query_uri.path(), "/api/v1/query");
    }

    #[test]
    fn evaluation_time_has_millis() {
        let t = evaluation_time();
        let (_, frac) = t.split_once('.').unwrap();
        assert_eq!(frac.len(), 3);
    }
}
