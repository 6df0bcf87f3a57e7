//! Built-in workshop content and an offline oracle for simulations

use async_trait::async_trait;
use labsync_core::{CheckId, CheckOutcome, CheckParams, StaticCatalog, VerificationOracle};
use labsync_model::{
    FlagDefinition, GamificationConfig, LabDefinition, LabNumber, QuestDefinition, StepDefinition,
    WorkshopMode, WorkshopTemplate,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Encryption workshop: three labs, two quests, two templates
pub(crate) fn catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_lab(
            LabDefinition::new("lab-csfle", LabNumber(1), "Client-side field level encryption")
                .with_step(StepDefinition::new("csfle-connect", "Connect with the encryption client"))
                .with_step(
                    StepDefinition::new("csfle-cmk", "Create the customer master key")
                        .with_verification("csfle.verifyCmkExists")
                        .with_hints(["Use `aws kms create-key`", "Name the alias alias/<your-name>"]),
                )
                .with_step(
                    StepDefinition::new("csfle-keyvault", "Create the key vault index")
                        .with_verification("csfle.verifyKeyVaultIndex"),
                )
                .with_step(
                    StepDefinition::new("csfle-encrypt", "Insert an encrypted document")
                        .with_verification("verify-field-encrypted")
                        .with_hints(["The schema map names the encrypted field"]),
                ),
        )
        .with_lab(
            LabDefinition::new("lab-qe", LabNumber(2), "Queryable encryption")
                .with_step(
                    StepDefinition::new("qe-deks", "Create one data key per field").with_verification("verify-qe-deks"),
                )
                .with_step(
                    StepDefinition::new("qe-collection", "Create the encrypted collection")
                        .with_verification("qe.verifyQECollection"),
                )
                .with_step(
                    StepDefinition::new("qe-range", "Run a range query")
                        .with_verification("verify-qe-range-query")
                        .with_hints(["Range fields need min and max"]),
                )
                .with_step(
                    StepDefinition::new("qe-walkthrough", "Facilitator walkthrough").with_modes([WorkshopMode::Demo]),
                ),
        )
        .with_lab(
            LabDefinition::new("lab-rotation", LabNumber(3), "Key rotation and tenants")
                .with_step(
                    StepDefinition::new("rotation-tenants", "Create per-tenant data keys")
                        .with_verification("verify-tenant-deks"),
                )
                .with_step(
                    StepDefinition::new("rotation-rewrap", "Rewrap the data keys")
                        .with_verification("verify-key-rotation"),
                ),
        )
        .with_quest(
            QuestDefinition::new("quest-recon", "Recon")
                .with_required(["flag-keyvault", "flag-datakey"])
                .with_optional(["flag-plaintext"]),
        )
        .with_quest(QuestDefinition::new("quest-breach", "Breach").with_required(["flag-decrypt"]))
        .with_flag(
            FlagDefinition::new("flag-keyvault", "quest-recon", "Find the key vault")
                .with_points(50)
                .with_verification("verify-index"),
        )
        .with_flag(
            FlagDefinition::new("flag-datakey", "quest-recon", "Locate a data key")
                .with_points(50)
                .with_verification("verify-datakey"),
        )
        .with_flag(
            FlagDefinition::new("flag-plaintext", "quest-recon", "Spot the plaintext field")
                .with_points(25)
                .with_verification("verify-field-encrypted"),
        )
        .with_flag(
            FlagDefinition::new("flag-decrypt", "quest-breach", "Decrypt a record")
                .with_points(100)
                .with_verification("verify-migration"),
        )
        .with_template(
            WorkshopTemplate::new("encryption-day", "Encryption day")
                .with_labs(["lab-csfle", "lab-qe", "lab-rotation"])
                .with_gamification(GamificationConfig::default().with_base_points(10)),
        )
        .with_template(
            WorkshopTemplate::new("encryption-ctf", "Encryption capture the flag")
                .with_mode(WorkshopMode::Challenge)
                .with_quests(["quest-recon", "quest-breach"])
                .with_gamification(GamificationConfig::default().with_quest_bonus(25)),
        )
}

/// Oracle that rejects every `fail_every`-th call and accepts the rest
#[derive(Debug)]
pub(crate) struct DemoOracle {
    calls: AtomicUsize,
    fail_every: usize,
}

impl DemoOracle {
    pub(crate) fn new(fail_every: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_every: fail_every.max(1),
        }
    }
}

#[async_trait]
impl VerificationOracle for DemoOracle {
    async fn verify(&self, check: &CheckId, _params: &CheckParams) -> CheckOutcome {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if call % self.fail_every == 0 {
            CheckOutcome::fail(format!("{check}: expected resource not found"))
        } else {
            CheckOutcome::pass(format!("{check}: ok"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_core::ContentCatalog;
    use labsync_model::TemplateId;

    #[test]
    fn verification_ids_resolve_to_known_checks() {
        let catalog = catalog();
        for lab in catalog.labs() {
            for step in &lab.steps {
                if let Some(raw) = &step.verification_id {
                    let check: CheckId = raw.parse().unwrap();
                    assert!(!matches!(check, CheckId::Other(_)), "{raw} is not a known check");
                }
            }
        }
    }

    #[test]
    fn challenge_template_defaults_to_challenge_mode() {
        let catalog = catalog();
        let template = catalog.template(&TemplateId::new("encryption-ctf")).unwrap();
        assert_eq!(template.default_mode, Some(WorkshopMode::Challenge));
    }

    #[tokio::test]
    async fn demo_oracle_fails_on_schedule() {
        let oracle = DemoOracle::new(3);
        let params = CheckParams::new();
        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(oracle.verify(&CheckId::DataKey, &params).await.success);
        }
        assert_eq!(results, vec![true, true, false, true, true, false]);
    }
}
