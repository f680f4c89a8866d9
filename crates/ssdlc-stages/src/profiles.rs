use ssdlc_stage_api::StageId;

/// Static description of what a stage asks the model for.
#[derive(Debug, Clone, Copy)]
pub struct StageProfile {
    pub stage: StageId,
    pub role: &'static str,
    pub task: &'static str,
    /// Earlier stages whose documents are inlined into the prompt
    pub consumes: &'static [StageId],
}

const INTERVIEW: StageProfile = StageProfile {
    stage: StageId::Interview,
    role: "a project manager gathering application requirements",
    task: "Summarize the application the user wants: purpose, target users, platform, \
           essential features and any technical constraints. The user's answers are in \
           the user request. For every topic the user left empty, answered with \
           \"pass\", \"AI\" or \"I don't know\", or did not mention, write a detailed \
           professional answer yourself and list that topic under \"assumed_defaults\" \
           so the user can confirm or correct it on a later turn.",
    consumes: &[],
};

const ENVIRONMENT: StageProfile = StageProfile {
    stage: StageId::Environment,
    role: "a systems analyst specifying the operational environment",
    task: "Describe runtime platform, operating system, database, hardware, network \
           and deployment requirements for the application.",
    consumes: &[StageId::Interview],
};

const SECURITY: StageProfile = StageProfile {
    stage: StageId::Security,
    role: "a security engineer writing security requirements",
    task: "List user roles, authentication and authorization rules, data protection, \
           audit logging and the main threats with their mitigations.",
    consumes: &[StageId::Interview, StageId::Environment],
};

const DESIGN: StageProfile = StageProfile {
    stage: StageId::Design,
    role: "a software architect producing a system design",
    task: "Describe the architecture, components and their interfaces, the data model \
           and how the security requirements are enforced.",
    consumes: &[StageId::Interview, StageId::Environment, StageId::Security],
};

const GENERATION: StageProfile = StageProfile {
    stage: StageId::Generation,
    role: "a senior developer generating the initial code base and documentation",
    task: "Produce the initial code base and its documentation as a \"files\" array of \
           {\"path\", \"content\"} objects, plus a \"summary\" of setup and usage. \
           Paths are relative to the project root and never use \"..\". Architecture \
           diagrams go in Markdown files as fenced mermaid blocks that start with a \
           diagram type such as flowchart or sequenceDiagram.",
    consumes: &[
        StageId::Interview,
        StageId::Environment,
        StageId::Security,
        StageId::Design,
    ],
};

impl StageProfile {
    #[must_use]
    pub const fn for_stage(stage: StageId) -> &'static StageProfile {
        match stage {
            StageId::Interview => &INTERVIEW,
            StageId::Environment => &ENVIRONMENT,
            StageId::Security => &SECURITY,
            StageId::Design => &DESIGN,
            StageId::Generation => &GENERATION,
        }
    }
}
