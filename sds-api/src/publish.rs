//! Publication orchestrator.
//!
//! Publication is a synchronous, multi-service choreography: mint a DOI,
//! record DataCite metadata, register the dataset in Metax, create the REMS
//! access resources, and persist the resulting identifiers as registrations
//! in the same transaction that flips the submission to published. The
//! transaction commit is the atomic boundary; external drafts minted before
//! a failure are left behind as drafts.

use axum::extract::{Path, State};
use axum::Json;
use sds_auth::AuthenticatedUser;
use sds_client::doi::{self, DoiPublication, DoiRegistry};
use sds_client::models::datacite::DataCiteMetadata;
use sds_client::models::rems::RemsSpec;
use sds_core::AppError;
use sds_data::entity::{ObjectEntity, SubmissionEntity, Workflow};
use sds_data::repository::{
    FileRepository, NewRegistration, ObjectRepository, RegistrationRepository,
    SubmissionRepository,
};
use sds_data::session::Session;
use tracing::info;

use crate::state::AppState;

/// Ordered FEGA object types; actions are applied in this order.
const FEGA_OBJECT_ORDER: [&str; 8] = [
    "study",
    "sample",
    "experiment",
    "run",
    "analysis",
    "dac",
    "policy",
    "dataset",
];

fn doi_url(doi: &str) -> String {
    format!("https://doi.org/{doi}")
}

/// PATCH /v1/publish/{submissionId}
pub async fn publish(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(submission_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let submission = SubmissionRepository.get_required(&session, &submission_id).await?;

    // Precondition gauntlet; each failure is a hard stop.
    state
        .authorize_project(&user.user_id, &submission.project_id)
        .await?;
    if submission.published {
        return Err(AppError::User("Submission already published".into()));
    }

    match submission.workflow {
        Workflow::Sd => publish_sd(&state, &session, &submission).await?,
        Workflow::Bp => publish_bp(&state, &session, &submission).await?,
        Workflow::Fega => publish_fega(&state, &session, &submission).await?,
    }

    // The conditional update is the guard against a concurrent publish that
    // committed while this request was talking to the external services.
    if !SubmissionRepository
        .set_published(&session, &submission.submission_id)
        .await?
    {
        return Err(AppError::User("Submission already published".into()));
    }

    info!(
        submission_id = %submission.submission_id,
        workflow = %submission.workflow,
        "submission published"
    );
    Ok(Json(serde_json::json!({"submissionId": submission.submission_id})))
}

/// The submission's DataCite metadata with workflow-specific presence
/// checks.
fn required_metadata(submission: &SubmissionEntity) -> Result<DataCiteMetadata, AppError> {
    let value = submission
        .metadata
        .as_ref()
        .ok_or_else(|| AppError::User("Missing DataCite metadata".into()))?;
    let metadata = DataCiteMetadata::parse(value)?;
    if metadata.creators.is_empty() {
        return Err(AppError::User("Missing DataCite creators".into()));
    }
    Ok(metadata)
}

fn required_bucket(submission: &SubmissionEntity) -> Result<&str, AppError> {
    submission
        .bucket
        .as_deref()
        .ok_or_else(|| AppError::User("Submission bucket must be set before publishing".into()))
}

/// Data files must exist in the bucket before anything is minted.
async fn check_bucket_files(state: &AppState, bucket: &str) -> Result<(), AppError> {
    let files = state.file_provider()?.list_files(bucket).await?;
    if files.is_empty() {
        return Err(AppError::NotFound(format!("No files found in '{bucket}'.")));
    }
    Ok(())
}

fn rems_spec(submission: &SubmissionEntity) -> Result<Option<RemsSpec>, AppError> {
    submission.rems.as_ref().map(RemsSpec::parse).transpose()
}

/// Create the REMS resource and catalogue item for one published unit.
async fn register_in_rems(
    state: &AppState,
    spec: &RemsSpec,
    doi: &str,
    title: &str,
    discovery_url: &str,
) -> Result<(i64, i64), AppError> {
    let rems = state.rems()?;
    let resource_id = rems
        .create_resource(
            Some(&spec.organization_id),
            spec.workflow_id,
            &spec.licenses,
            doi,
        )
        .await?;
    let catalogue_id = rems
        .create_catalogue_item(
            &spec.organization_id,
            spec.workflow_id,
            resource_id,
            title,
            discovery_url,
        )
        .await?;
    Ok((resource_id, catalogue_id))
}

/// SD: one DOI through the PID proxy, a Metax dataset, optional REMS
/// registration, one Registration row.
async fn publish_sd(
    state: &AppState,
    session: &Session,
    submission: &SubmissionEntity,
) -> Result<(), AppError> {
    let metadata = required_metadata(submission)?;
    let rems = rems_spec(submission)?;
    let bucket = required_bucket(submission)?;
    check_bucket_files(state, bucket).await?;

    let pid = state.pid()?;
    let metax = state.metax()?;

    let doi = pid.create_draft_doi().await?;
    let metax_id = metax
        .create_draft_dataset(&doi, &submission.title, &submission.description)
        .await?;

    // The DOI resolves to the Metax discovery page. The DOI itself stays a
    // draft here; Metax publication is the visible step.
    doi::publish(
        pid.as_ref(),
        Some(metax.as_ref()),
        metadata.clone(),
        DoiPublication {
            doi: &doi,
            submission_id: &submission.submission_id,
            title: &submission.title,
            description: &submission.description,
            discovery_url: &state.discovery_url_for(&metax_id),
            require_field_of_science: true,
            publish: false,
        },
    )
    .await?;

    let mapper = state.metax_mapper()?;
    let draft = metax.get_dataset(&metax_id).await?;
    let fields = mapper.map(&draft, &metadata).await?;
    metax.patch_dataset(&metax_id, &fields).await?;

    let mut registration = NewRegistration {
        submission_id: submission.submission_id.clone(),
        object_id: None,
        object_type: None,
        title: submission.title.clone(),
        description: submission.description.clone(),
        doi: doi.clone(),
        metax_id: Some(metax_id.clone()),
        datacite_url: None,
        rems_url: None,
        rems_resource_id: None,
        rems_catalogue_id: None,
    };

    if let Some(spec) = &rems {
        let discovery_url = state.discovery_url_for(&metax_id);
        let (resource_id, catalogue_id) =
            register_in_rems(state, spec, &doi, &submission.title, &discovery_url).await?;

        let rems_client = state.rems()?;
        let application_url = rems_client.get_application_url(catalogue_id);
        metax
            .update_dataset_description(
                &metax_id,
                &format!(
                    "{}\n\nSD Apply Application link: {application_url}",
                    submission.description
                ),
            )
            .await?;

        registration.rems_url = Some(application_url);
        registration.rems_resource_id = Some(resource_id.to_string());
        registration.rems_catalogue_id = Some(catalogue_id.to_string());
    }

    metax.publish_dataset(&metax_id, &doi).await?;

    RegistrationRepository.add(session, registration).await?;
    Ok(())
}

/// BP dataset objects with their attached files.
async fn bp_dataset_objects(
    session: &Session,
    submission: &SubmissionEntity,
) -> Result<Vec<ObjectEntity>, AppError> {
    let datasets = ObjectRepository
        .list(session, &submission.submission_id, Some("dataset"))
        .await?;
    if datasets.is_empty() {
        return Err(AppError::User(
            "BP submission requires at least one dataset metadata object".into(),
        ));
    }
    for dataset in &datasets {
        let files = FileRepository.list_by_object(session, &dataset.object_id).await?;
        if files.is_empty() {
            return Err(AppError::User(format!(
                "Dataset '{}' has no attached data files",
                dataset.object_id
            )));
        }
    }
    Ok(datasets)
}

/// BP: one DataCite DOI per dataset object, published directly; optional
/// REMS registration per object; one Registration row per object.
async fn publish_bp(
    state: &AppState,
    session: &Session,
    submission: &SubmissionEntity,
) -> Result<(), AppError> {
    let metadata = required_metadata(submission)?;
    let rems = rems_spec(submission)?;
    let bucket = required_bucket(submission)?;
    let datasets = bp_dataset_objects(session, submission).await?;
    check_bucket_files(state, bucket).await?;

    let datacite = state.datacite()?;

    for dataset in datasets {
        let title = dataset.title.clone().unwrap_or_else(|| submission.title.clone());
        let description = dataset
            .description
            .clone()
            .unwrap_or_else(|| submission.description.clone());

        let doi = datacite.create_draft_doi().await?;
        let discovery_url = doi_url(&doi);

        doi::publish(
            datacite.as_ref(),
            state.metax.as_deref(),
            metadata.clone(),
            DoiPublication {
                doi: &doi,
                submission_id: &submission.submission_id,
                title: &title,
                description: &description,
                discovery_url: &discovery_url,
                require_field_of_science: false,
                publish: true,
            },
        )
        .await?;

        let mut registration = NewRegistration {
            submission_id: submission.submission_id.clone(),
            object_id: Some(dataset.object_id.clone()),
            object_type: Some(dataset.object_type.clone()),
            title,
            description,
            doi: doi.clone(),
            metax_id: None,
            datacite_url: Some(discovery_url.clone()),
            rems_url: None,
            rems_resource_id: None,
            rems_catalogue_id: None,
        };

        if let Some(spec) = &rems {
            let (resource_id, catalogue_id) =
                register_in_rems(state, spec, &doi, &registration.title, &discovery_url).await?;
            registration.rems_url = Some(state.rems()?.get_application_url(catalogue_id));
            registration.rems_resource_id = Some(resource_id.to_string());
            registration.rems_catalogue_id = Some(catalogue_id.to_string());
        }

        RegistrationRepository.add(session, registration).await?;
    }
    Ok(())
}

/// FEGA: apply the action set over the ordered object types, then mint one
/// DOI through the PID proxy and record a single registration. Metax and
/// REMS are not involved.
async fn publish_fega(
    state: &AppState,
    session: &Session,
    submission: &SubmissionEntity,
) -> Result<(), AppError> {
    let objects = ObjectRepository
        .list(session, &submission.submission_id, None)
        .await?;

    for object in &objects {
        if !FEGA_OBJECT_ORDER.contains(&object.object_type.as_str()) {
            return Err(AppError::User(format!(
                "Unsupported FEGA metadata object type '{}'",
                object.object_type
            )));
        }
    }
    for required in ["study", "dataset"] {
        if !objects.iter().any(|o| o.object_type == required) {
            return Err(AppError::User(format!(
                "FEGA submission requires a {required} metadata object"
            )));
        }
    }

    let bucket = required_bucket(submission)?;
    check_bucket_files(state, bucket).await?;

    // Apply the actions in schema order; validation failures carry the
    // originating object.
    for object_type in FEGA_OBJECT_ORDER {
        for object in objects.iter().filter(|o| o.object_type == object_type) {
            if object.document.is_null()
                || object.document.as_object().is_some_and(|o| o.is_empty())
            {
                return Err(AppError::User(format!(
                    "Metadata object '{}' of type '{object_type}' has an empty document",
                    object.object_id
                )));
            }
        }
    }

    let pid = state.pid()?;
    let doi = pid.create_draft_doi().await?;

    if let Some(metadata) = submission.metadata.as_ref() {
        let metadata = DataCiteMetadata::parse(metadata)?;
        doi::publish(
            pid.as_ref(),
            state.metax.as_deref(),
            metadata,
            DoiPublication {
                doi: &doi,
                submission_id: &submission.submission_id,
                title: &submission.title,
                description: &submission.description,
                discovery_url: &state.discovery_url_for(&doi),
                require_field_of_science: false,
                publish: false,
            },
        )
        .await?;
    }

    RegistrationRepository
        .add(
            session,
            NewRegistration {
                submission_id: submission.submission_id.clone(),
                object_id: None,
                object_type: None,
                title: submission.title.clone(),
                description: submission.description.clone(),
                doi,
                metax_id: None,
                datacite_url: None,
                rems_url: None,
                rems_resource_id: None,
                rems_catalogue_id: None,
            },
        )
        .await?;
    Ok(())
}
