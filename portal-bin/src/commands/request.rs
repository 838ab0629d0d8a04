use anyhow::Result;
use portal_lib::monitor::{STATUS_ERROR, STATUS_SUCCESS, STATUS_TAG};
use portal_lib::{ApiResponse, BatchRequest};
use serde_json::Value;

use super::CommandParams;
use crate::ExitCode;
use crate::stats::ResponseStats;

/// Send every endpoint through the client, at most `concurrency` at a time.
///
/// Responses come back in the order of the endpoints; failed requests are
/// reported in-band.
pub(crate) async fn request(
    params: CommandParams,
) -> Result<(Vec<ApiResponse<Value>>, ResponseStats, ExitCode)> {
    let CommandParams {
        client,
        monitor,
        endpoints,
        cfg,
    } = params;

    let options = cfg.request_options()?;
    let batch: Vec<BatchRequest> = endpoints
        .iter()
        .map(|endpoint| BatchRequest::new(endpoint.as_str()).with_options(options.clone()))
        .collect();

    log::info!(
        "Sending {} request(s), {} at a time",
        batch.len(),
        cfg.concurrency.max(1)
    );

    let responses = monitor
        .measure_async("batch", async {
            let responses = client.batch_requests(batch, cfg.concurrency).await;
            if responses.iter().all(ApiResponse::is_success) {
                Ok(responses)
            } else {
                Err(responses)
            }
        })
        .await
        .unwrap_or_else(|responses| responses);

    for (endpoint, response) in endpoints.iter().zip(&responses) {
        let status = if response.is_success() {
            STATUS_SUCCESS
        } else {
            STATUS_ERROR
        };
        monitor.record_metric(
            "response",
            f64::from(response.status),
            [("endpoint", endpoint.as_str()), (STATUS_TAG, status)],
        );
        if let Some(error) = response.error() {
            log::warn!("{endpoint}: {error}");
        }
    }

    let stats: ResponseStats = responses.iter().collect();
    let exit_code = if stats.is_success() {
        ExitCode::Success
    } else {
        ExitCode::RequestFailure
    };
    Ok((responses, stats, exit_code))
}
