//! Last-write-wins merge of a partial entry into the running entry.

use serde_json::{Map, Value};

use crate::entry::{Block, BlockPayload, Entry, MarkdownBlock, PatchBlock, DIFF_FIELD};
use crate::patch::{apply_patch, PatchError, PatchOperation};

/// A diff block that could not be applied and was shallow-merged instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFailure {
    pub intended_usage: String,
    pub field: String,
    pub error: PatchError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub entry: Entry,
    pub patch_failures: Vec<PatchFailure>,
}

/// Merge `incoming` over `existing`. Later writes win; patch failures are
/// recovered locally.
pub fn merge(existing: &Entry, incoming: &Entry) -> Entry {
    merge_with_diagnostics(existing, incoming).entry
}

/// [`merge`], also reporting every diff block that fell back to a shallow merge.
pub fn merge_with_diagnostics(existing: &Entry, incoming: &Entry) -> MergeOutcome {
    let mut patch_failures = Vec::new();

    let mut extra = existing.extra.clone();
    extend_fields(&mut extra, &incoming.extra);

    let entry = Entry {
        uuid: last_write(&existing.uuid, &incoming.uuid),
        backend_uuid: last_write(&existing.backend_uuid, &incoming.backend_uuid),
        status: last_write(&existing.status, &incoming.status),
        is_final: last_write(&existing.is_final, &incoming.is_final),
        cursor: last_write(&existing.cursor, &incoming.cursor),
        text: last_write(&existing.text, &incoming.text),
        error_code: last_write(&existing.error_code, &incoming.error_code),
        blocks: merge_blocks(&existing.blocks, &incoming.blocks, &mut patch_failures),
        extra,
    };

    MergeOutcome {
        entry,
        patch_failures,
    }
}

fn last_write<T: Clone>(existing: &Option<T>, incoming: &Option<T>) -> Option<T> {
    incoming.clone().or_else(|| existing.clone())
}

fn extend_fields(target: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
}

fn merge_blocks(
    existing: &[Block],
    incoming: &[Block],
    failures: &mut Vec<PatchFailure>,
) -> Vec<Block> {
    // Keyed by intended_usage, first-seen order.
    let mut merged: Vec<Block> = Vec::with_capacity(existing.len() + incoming.len());
    for block in existing {
        upsert(&mut merged, block.clone());
    }

    for block in incoming {
        let slot = merged
            .iter()
            .position(|candidate| candidate.intended_usage == block.intended_usage);
        let next = merge_block(slot.map(|index| &merged[index]), block, failures);
        match slot {
            Some(index) => merged[index] = next,
            None => merged.push(next),
        }
    }

    merged
}

fn upsert(blocks: &mut Vec<Block>, block: Block) {
    match blocks
        .iter_mut()
        .find(|candidate| candidate.intended_usage == block.intended_usage)
    {
        Some(slot) => *slot = block,
        None => blocks.push(block),
    }
}

fn merge_block(
    previous: Option<&Block>,
    incoming: &Block,
    failures: &mut Vec<PatchFailure>,
) -> Block {
    match &incoming.payload {
        BlockPayload::Markdown(markdown) => {
            let merged = merge_markdown(previous.and_then(Block::markdown), markdown);
            let mut block = base_block(previous, incoming);
            block.replace_payload(BlockPayload::Markdown(merged));
            block
        }
        BlockPayload::Patch(patch) => match apply_block_patch(previous, incoming, patch) {
            Ok(block) => block,
            Err(error) => {
                tracing::debug!(
                    intended_usage = %incoming.intended_usage,
                    field = patch.field.as_deref().unwrap_or(""),
                    %error,
                    "diff block fell back to shallow merge"
                );
                failures.push(PatchFailure {
                    intended_usage: incoming.intended_usage.clone(),
                    field: patch.field.clone().unwrap_or_default(),
                    error,
                });
                shallow_merge(previous, incoming)
            }
        },
        BlockPayload::WebResults(_) | BlockPayload::Other => shallow_merge(previous, incoming),
    }
}

/// Previous block (or an empty one under the incoming key) with the incoming
/// non-payload fields written over it.
fn base_block(previous: Option<&Block>, incoming: &Block) -> Block {
    let mut block = previous
        .cloned()
        .unwrap_or_else(|| Block::new(incoming.intended_usage.clone(), BlockPayload::Other));
    extend_fields(&mut block.extra, &incoming.extra);
    block
}

fn shallow_merge(previous: Option<&Block>, incoming: &Block) -> Block {
    let mut block = base_block(previous, incoming);
    match &incoming.payload {
        BlockPayload::Other => {}
        // A diff block never displaces content that is already there.
        BlockPayload::Patch(patch) if block.payload != BlockPayload::Other => {
            if let Ok(value) = serde_json::to_value(patch) {
                block.extra.insert(DIFF_FIELD.to_owned(), value);
            }
        }
        payload => block.replace_payload(payload.clone()),
    }
    block
}

fn merge_markdown(previous: Option<&MarkdownBlock>, incoming: &MarkdownBlock) -> MarkdownBlock {
    let Some(previous) = previous else {
        return incoming.clone();
    };

    let chunks = match (&incoming.chunks, incoming.chunk_starting_offset.unwrap_or(0)) {
        (None, _) => previous.chunks.clone(),
        (Some(chunks), 0) => Some(chunks.clone()),
        (Some(chunks), offset) => {
            let mut spliced: Vec<String> = previous
                .chunks
                .iter()
                .flatten()
                .take(offset)
                .cloned()
                .collect();
            spliced.extend(chunks.iter().cloned());
            Some(spliced)
        }
    };

    let mut extra = previous.extra.clone();
    extend_fields(&mut extra, &incoming.extra);

    MarkdownBlock {
        progress: last_write(&previous.progress, &incoming.progress),
        chunks,
        chunk_starting_offset: last_write(
            &previous.chunk_starting_offset,
            &incoming.chunk_starting_offset,
        ),
        answer: last_write(&previous.answer, &incoming.answer),
        extra,
    }
}

fn apply_block_patch(
    previous: Option<&Block>,
    incoming: &Block,
    patch: &PatchBlock,
) -> Result<Block, PatchError> {
    let field = patch.target_field()?;
    let operations = patch.operations()?;
    let current = previous
        .and_then(|block| block.field_value(field))
        .unwrap_or_else(|| default_target(&operations));
    let patched = apply_patch(&current, &operations)?;

    let mut block = base_block(previous, incoming);
    block.set_field(field, patched)?;
    // A diff stashed by an earlier fallback is superseded.
    block.extra.remove(DIFF_FIELD);
    Ok(block)
}

/// Starting value for a field the block has never carried.
fn default_target(operations: &[PatchOperation]) -> Value {
    match operations.first() {
        Some(operation) if operation.path().is_empty() => Value::String(String::new()),
        _ => Value::Object(Map::new()),
    }
}
