use aws_sdk_secretsmanager::error::DisplayErrorContext;
use fernet_key_lambda::adapters::response_sender::ResponseSender;
use fernet_key_lambda::adapters::secret_store::{SecretStore, SecretWriteReceipt};
use fernet_key_lambda::handlers::lifecycle::{handle_lifecycle_event, invocation_result};
use fernet_key_lambda::runtime::config::HandlerConfig;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

struct SecretsManagerStore {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretStore for SecretsManagerStore {
    fn put_secret_value(
        &self,
        secret_id: &str,
        value: &str,
    ) -> Result<SecretWriteReceipt, String> {
        let client = self.client.clone();
        let secret_id = secret_id.to_string();
        let secret_string = value.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_secret_value()
                    .secret_id(secret_id)
                    .secret_string(secret_string)
                    .send()
                    .await
                    .map(|output| SecretWriteReceipt {
                        arn: output.arn().map(str::to_string),
                        version_id: output.version_id().map(str::to_string),
                    })
                    .map_err(|error| {
                        format!("failed to put secret value: {}", DisplayErrorContext(&error))
                    })
            })
        })
    }
}

struct HttpResponseSender {
    http_client: reqwest::Client,
}

impl ResponseSender for HttpResponseSender {
    fn send_response(&self, response_url: &str, body: &[u8]) -> Result<(), String> {
        let client = self.http_client.clone();
        let url = response_url.to_string();
        let body_bytes = body.to_vec();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                // The pre-signed URL is signed without a content type.
                let response = client
                    .put(url)
                    .header(CONTENT_TYPE, "")
                    .body(body_bytes)
                    .send()
                    .await
                    .map_err(|error| format!("failed to put response document: {error}"))?;
                response
                    .error_for_status()
                    .map(|_| ())
                    .map_err(|error| format!("response url rejected document: {error}"))
            })
        })
    }
}

struct RuntimeDependencies {
    secret_store: SecretsManagerStore,
    response_sender: HttpResponseSender,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<Value, Error> {
    let config = HandlerConfig::from_env();

    let result = handle_lifecycle_event(
        event.payload,
        &config,
        &deps.secret_store,
        &deps.response_sender,
    );
    invocation_result(result).map_err(Error::from)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies {
        secret_store: SecretsManagerStore {
            client: aws_sdk_secretsmanager::Client::new(&aws_config),
        },
        response_sender: HttpResponseSender {
            http_client: reqwest::Client::new(),
        },
    };
    let deps = &deps;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, deps).await
    }))
    .await
}
