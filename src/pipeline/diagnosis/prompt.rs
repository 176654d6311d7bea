/// Version tag of the instruction asset; bump together with the file name.
pub const PROMPT_VERSION: &str = "leaf-diagnosis/v1";

/// Fixed system instruction sent to every provider.
///
/// Static configuration data: the worked examples inside steer the remote
/// model's output format and are never interpreted locally.
pub const DIAGNOSIS_SYSTEM_PROMPT: &str = include_str!("prompts/leaf_diagnosis_v1.txt");

/// Text part of the user turn that accompanies the image.
pub const USER_INSTRUCTION: &str =
    "Analyze this leaf. Answer with the JSON object only, following the system instructions.";
