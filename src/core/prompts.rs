// src/core/prompts.rs — Builder, critic and describer prompts

use minijinja::{context, Environment};

use super::types::{Artifact, Context, Task};
use crate::infra::errors::GenerationError;
use crate::memory::ScoredSkill;
use crate::provider::{GenerationRequest, ResponseHint};

const BUILD_SYSTEM: &str = "You are an expert software engineer. Write a complete, \
self-contained solution for the task. Respond with the full source code only, \
with no markdown fences and no commentary.";

const ATTACK_SYSTEM: &str = "You are an adversarial tester. Your only goal is to \
break the code you are given. Target logic errors, boundary conditions, invalid \
inputs and performance cliffs. Respond with pure test code only, with no markdown \
fences and no commentary.";

const DESCRIBE_SYSTEM: &str = "You write one-sentence summaries of code for a \
searchable library of reusable skills.";

const CURRICULUM_SYSTEM: &str = "You set coding challenges for an autonomous software \
engineer. Each challenge must be solvable in a single self-contained source file and \
checkable by an automated test program.";

const BUILD_TEMPLATE: &str = r#"# Task
{{ objective }}
{% if constraints %}

## Constraints
{% for c in constraints %}
- {{ c }}
{% endfor %}
{% endif %}
{% if skill_hints %}

# Relevant skills from memory
Reuse or adapt these verified solutions where they fit.

{{ skill_hints }}
{% endif %}
{% if notes %}

# Previous failed attempts
Do not repeat these approaches.

{% for note in notes %}
{{ note }}

{% endfor %}
{% endif %}"#;

const ATTACK_TEMPLATE: &str = r#"# Task the solution claims to solve
{{ objective }}

# Proposed solution ({{ solution_id }})
The code below is saved as the module `solution` and can be imported from the tests.

{{ solution }}

Write tests that expose every bug you can find. The test program must exit with a
non-zero status when any check fails and with status 0 only when all checks pass."#;

const DESCRIBE_TEMPLATE: &str = r#"Task: {{ objective }}

Code:
{{ code }}

Describe in one sentence what this code does."#;

const CURRICULUM_TEMPLATE: &str = r#"Difficulty: {{ difficulty }}/10.
{% if difficulty <= 3 %}
Focus on basic algorithms and data structures.
{% elif difficulty <= 7 %}
Focus on parsing, state machines and API-style interfaces with tricky edge cases.
{% else %}
Focus on concurrency, input validation against hostile data and performance limits.
{% endif %}
{% if recent %}

Do not repeat any of these recent challenges:
{% for r in recent %}
- {{ r }}
{% endfor %}
{% endif %}

Describe one new challenge in a single paragraph. Reply with the challenge only."#;

/// Renders generation requests for each phase of an attempt.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        Self { env }
    }

    pub fn build_request(&self, ctx: &Context) -> Result<GenerationRequest, GenerationError> {
        let notes: Vec<&str> = ctx.notes().map(|n| n.text.as_str()).collect();
        let prompt = self.render(
            BUILD_TEMPLATE,
            context! {
                objective => &ctx.task.objective,
                constraints => &ctx.task.constraints,
                skill_hints => format_skill_hints(&ctx.skills),
                notes => notes,
            },
        )?;
        Ok(GenerationRequest::new(
            BUILD_SYSTEM,
            prompt,
            ResponseHint::Solution,
        ))
    }

    pub fn attack_request(
        &self,
        ctx: &Context,
        solution: &Artifact,
    ) -> Result<GenerationRequest, GenerationError> {
        let prompt = self.render(
            ATTACK_TEMPLATE,
            context! {
                objective => &ctx.task.objective,
                solution_id => solution.id.short(),
                solution => &solution.code,
            },
        )?;
        Ok(GenerationRequest::new(ATTACK_SYSTEM, prompt, ResponseHint::Tests))
    }

    pub fn describe_request(
        &self,
        task: &Task,
        solution: &Artifact,
    ) -> Result<GenerationRequest, GenerationError> {
        let prompt = self.render(
            DESCRIBE_TEMPLATE,
            context! {
                objective => &task.objective,
                code => &solution.code,
            },
        )?;
        let mut request = GenerationRequest::new(DESCRIBE_SYSTEM, prompt, ResponseHint::Description);
        request.max_tokens = Some(120);
        Ok(request)
    }

    pub fn curriculum_request(
        &self,
        difficulty: u8,
        recent: &[String],
    ) -> Result<GenerationRequest, GenerationError> {
        let prompt = self.render(
            CURRICULUM_TEMPLATE,
            context! {
                difficulty => difficulty,
                recent => recent,
            },
        )?;
        let mut request =
            GenerationRequest::new(CURRICULUM_SYSTEM, prompt, ResponseHint::Description);
        request.max_tokens = Some(400);
        Ok(request)
    }

    fn render(&self, template: &str, ctx: minijinja::Value) -> Result<String, GenerationError> {
        self.env
            .render_str(template, ctx)
            .map_err(|e| GenerationError::Permanent {
                provider: "prompts".into(),
                message: format!("Template rendering failed: {}", e),
            })
    }
}

/// Render retrieved skills as numbered hint blocks for the builder.
pub fn format_skill_hints(skills: &[ScoredSkill]) -> String {
    skills
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            format!(
                "[Skill #{}: {}] (similarity {:.2})\nDescription: {}\nCode:\n{}\n",
                i + 1,
                scored.skill.name,
                scored.similarity,
                scored.skill.description,
                scored.skill.solution.code
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
