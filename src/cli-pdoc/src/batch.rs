//! Batched generation: requests go out a batch at a time, and every member
//! of a batch settles before the next batch starts.

use std::future::Future;

use data_model_pdoc::models::{ClientRecord, GenerationResult};

use crate::errors::Error;

/// Runs `generate` for every client, `batch_size` requests at a time.
///
/// A failed request becomes a `success: false` result instead of aborting
/// the run; either way the client record is attached so a later export can
/// reproduce the full row without a database round trip. Results come back
/// in input order.
pub async fn generate_in_batches<F, Fut>(clients: &[ClientRecord], batch_size: usize, generate: F) -> Vec<GenerationResult>
where
    F: Fn(ClientRecord) -> Fut,
    Fut: Future<Output = Result<GenerationResult, Error>>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(clients.len());

    for batch in clients.chunks(batch_size) {
        let settled = futures::future::join_all(batch.iter().map(|client| {
            let generate = &generate;
            async move {
                match generate(client.clone()).await {
                    Ok(mut result) => {
                        result.client = Some(client.clone());
                        result
                    }
                    Err(e) => {
                        tracing::error!(client_email = %client.email, error = %e, "Generation request failed");
                        let mut result = GenerationResult::failure(&client.email, e.to_string());
                        result.client = Some(client.clone());
                        result
                    }
                }
            }
        }))
        .await;
        results.extend(settled);
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn clients(n: usize) -> Vec<ClientRecord> {
        (0..n).map(|i| ClientRecord::new(format!("client{}@example.com", i))).collect()
    }

    fn ok_result(email: &str) -> GenerationResult {
        GenerationResult {
            client_email: email.to_string(),
            client: None,
            success: true,
            documents: Default::default(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_results_keep_input_order_and_attach_clients() {
        let input = clients(5);
        let results = generate_in_batches(&input, 2, |c| async move { Ok(ok_result(&c.email)) }).await;

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.client_email, format!("client{}@example.com", i));
            assert!(result.success);
            assert_eq!(result.client.as_ref().unwrap().email, result.client_email);
        }
    }

    #[tokio::test]
    async fn test_failures_become_unsuccessful_results() {
        let input = clients(3);
        let calls = AtomicUsize::new(0);

        let results = generate_in_batches(&input, 10, |c| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    Err(Error::ApiError {
                        status: 500,
                        body: "boom".to_string(),
                    })
                } else {
                    Ok(ok_result(&c.email))
                }
            }
        })
        .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("boom"));
        // The failed result still carries its client for the export.
        assert!(results[1].client.is_some());
        assert!(results[2].success);
    }

    #[tokio::test]
    async fn test_batches_settle_in_chunks() {
        let input = clients(5);
        let seen_batches = Mutex::new(Vec::new());
        let calls = AtomicUsize::new(0);

        let _ = generate_in_batches(&input, 2, |c| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            seen_batches.lock().unwrap().push(call / 2);
            async move { Ok(ok_result(&c.email)) }
        })
        .await;

        // 5 clients in batches of 2 -> batches 0, 0, 1, 1, 2.
        assert_eq!(*seen_batches.lock().unwrap(), vec![0, 0, 1, 1, 2]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let input = clients(2);
        let results = generate_in_batches(&input, 0, |c| async move { Ok(ok_result(&c.email)) }).await;
        assert_eq!(results.len(), 2);
    }
}
