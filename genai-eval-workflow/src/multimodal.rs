//! Judge payloads and generator prompts that may carry multimodal parts.

use genai_eval_core::{
    probe_multimodal, value_to_text, ContentList, ContentMap, InstanceInput, ModelPrompt,
    MultimodalMode, Part, PromptTemplate, Result, TemplateSegment,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Build the instance payload for a model-based request.
///
/// Flat JSON when every input is text; otherwise a content map where text inputs are
/// wrapped in a single text part.
pub fn build_instance(inputs: &BTreeMap<String, Value>, mode: MultimodalMode) -> Result<InstanceInput> {
    let mut probed = Vec::with_capacity(inputs.len());
    let mut any_multimodal = false;
    for (name, value) in inputs {
        let content = probe_multimodal(value, mode)?;
        any_multimodal |= content.is_some();
        probed.push((name, value, content));
    }

    if any_multimodal {
        let map: ContentMap = probed
            .into_iter()
            .map(|(name, value, content)| {
                let list = content.unwrap_or_else(|| ContentList::from_text(value_to_text(value)));
                (name.clone(), list)
            })
            .collect();
        return Ok(InstanceInput::ContentMapInstance(map));
    }

    let flat: Map<String, Value> = probed
        .into_iter()
        .map(|(name, value, _)| (name.clone(), Value::String(value_to_text(value))))
        .collect();
    Ok(InstanceInput::JsonInstance(serde_json::to_string(&flat)?))
}

/// Fill `template` for a generator call.
///
/// Plain text when no value is multimodal. Otherwise the template is split on its
/// placeholders and literal text, text values and file parts are interleaved in order.
/// Placeholders without a value stay in the text verbatim.
pub fn assemble_prompt<'a, F>(template: &PromptTemplate, lookup: F, mode: MultimodalMode) -> Result<ModelPrompt>
where
    F: Fn(&str) -> Option<&'a Value>,
{
    let mut parts: Vec<Part> = Vec::new();
    let mut any_multimodal = false;

    for segment in template.segments() {
        match segment {
            TemplateSegment::Literal(text) => push_text(&mut parts, text),
            TemplateSegment::Placeholder(name) => match lookup(&name) {
                Some(value) => match probe_multimodal(value, mode)? {
                    Some(list) => {
                        any_multimodal = true;
                        for part in list.parts() {
                            match part {
                                Part::Text(text) => push_text(&mut parts, text.clone()),
                                file => parts.push(file.clone()),
                            }
                        }
                    }
                    None => push_text(&mut parts, value_to_text(value)),
                },
                None => push_text(&mut parts, format!("{{{}}}", name)),
            },
        }
    }

    if any_multimodal {
        return Ok(ModelPrompt::Parts(parts));
    }
    Ok(ModelPrompt::Text(
        parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<String>(),
    ))
}

fn push_text(parts: &mut Vec<Part>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(Part::Text(last)) = parts.last_mut() {
        last.push_str(&text);
    } else {
        parts.push(Part::Text(text));
    }
}
