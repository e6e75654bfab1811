use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::{header, Client};
use serde::Deserialize;

use crate::{
    collaborators::{read_success_body, SpeechTranscriber, TranscriptStream},
    config::SpeechConfig,
    error::CollaboratorError,
};

const SERVICE: &str = "speech recognition";

/// Short-audio recognition over a captured WAV sample. Without an audio
/// source there is nothing to listen to and `start` reports the service as
/// unavailable.
pub struct AzureSpeechTranscriber {
    client: Client,
    config: SpeechConfig,
    audio: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

impl AzureSpeechTranscriber {
    pub fn new(client: Client, config: SpeechConfig, audio: Option<PathBuf>) -> Self {
        Self {
            client,
            config,
            audio,
        }
    }

    fn recognition_url(&self) -> String {
        format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1",
            self.config.region
        )
    }
}

#[async_trait]
impl SpeechTranscriber for AzureSpeechTranscriber {
    async fn start(&self) -> Result<TranscriptStream, CollaboratorError> {
        let audio = self
            .audio
            .clone()
            .ok_or_else(|| CollaboratorError::missing(SERVICE, "no audio input available"))?;
        let samples = tokio::fs::read(&audio).await.map_err(|err| {
            CollaboratorError::missing(SERVICE, format!("cannot read {}: {err}", audio.display()))
        })?;

        let request = self
            .client
            .post(self.recognition_url())
            .query(&[("language", "en-US"), ("format", "simple")])
            .header("Ocp-Apim-Subscription-Key", &self.config.key)
            .header(
                header::CONTENT_TYPE,
                "audio/wav; codecs=audio/pcm; samplerate=16000",
            )
            .body(samples);

        let recognition = stream::once(async move {
            let response = request
                .send()
                .await
                .map_err(|err| CollaboratorError::transient(SERVICE, err))?;
            let body = read_success_body(SERVICE, response).await?;
            parse_recognition(&body)
        })
        .filter_map(|fragment| async move {
            match fragment {
                Ok(text) if text.is_empty() => None,
                other => Some(other),
            }
        });

        Ok(recognition.boxed())
    }
}

fn parse_recognition(body: &str) -> Result<String, CollaboratorError> {
    let parsed: RecognitionResponse =
        serde_json::from_str(body).map_err(|err| CollaboratorError::malformed(SERVICE, err))?;

    match parsed.recognition_status.as_str() {
        "Success" => Ok(parsed.display_text.unwrap_or_default().trim().to_string()),
        "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => Ok(String::new()),
        other => Err(CollaboratorError::malformed(
            SERVICE,
            format!("recognition status {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcriber(audio: Option<PathBuf>) -> AzureSpeechTranscriber {
        AzureSpeechTranscriber::new(
            Client::new(),
            SpeechConfig {
                key: "k".to_string(),
                region: "eastus".to_string(),
            },
            audio,
        )
    }

    #[test]
    fn recognition_results_are_parsed() {
        let body = r#"{"RecognitionStatus":"Success","DisplayText":"The boy is reaching for the cookie jar.","Offset":0,"Duration":1}"#;
        assert_eq!(
            parse_recognition(body).unwrap(),
            "The boy is reaching for the cookie jar."
        );
        assert_eq!(
            parse_recognition(r#"{"RecognitionStatus":"NoMatch"}"#).unwrap(),
            ""
        );
        assert!(parse_recognition(r#"{"RecognitionStatus":"Error"}"#).is_err());
    }

    #[test]
    fn url_uses_region() {
        assert!(transcriber(None)
            .recognition_url()
            .starts_with("https://eastus.stt.speech.microsoft.com/"));
    }

    #[tokio::test]
    async fn missing_audio_is_a_configuration_error() {
        let result = transcriber(None).start().await;
        assert!(matches!(
            result,
            Err(CollaboratorError::ConfigurationMissing { .. })
        ));

        let result = transcriber(Some(PathBuf::from("/nonexistent/sample.wav")))
            .start()
            .await;
        assert!(matches!(
            result,
            Err(CollaboratorError::ConfigurationMissing { .. })
        ));
    }
}
