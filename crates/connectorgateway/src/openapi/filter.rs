// Operation filtering and family deduplication
//
// Connector schemas accumulate SendMessageV2, SendMessageV3, ... under one
// x-ms-api-annotation family; only the newest user-facing revision surfaces.

use std::collections::HashMap;

use itertools::Itertools;
use tracing::debug;

use super::types::{ParsedOperation, Visibility};

/// Drop internal, trigger, and webhook-management operations, then keep only
/// the highest-revision member of each annotation family (ties keep the
/// first seen). Operations without a family survive unless deprecated.
/// Survivor order follows the input.
pub fn filter_operations(operations: Vec<ParsedOperation>) -> Vec<ParsedOperation> {
	let total = operations.len();
	let visible = operations
		.into_iter()
		.filter(|op| op.visibility != Visibility::Internal)
		.filter(|op| !op.is_trigger)
		.filter(|op| !op.path.contains("$subscriptions"))
		.collect_vec();

	// family -> (revision, index of the winner within `visible`)
	let mut winners: HashMap<&str, (i64, usize)> = HashMap::new();
	for (index, op) in visible.iter().enumerate() {
		let Some(family) = op.api_annotation.as_ref().and_then(|a| a.family.as_deref()) else {
			continue;
		};
		let revision = op.api_annotation.as_ref().map(|a| a.revision).unwrap_or(1);
		winners
			.entry(family)
			.and_modify(|best| {
				if revision > best.0 {
					*best = (revision, index);
				}
			})
			.or_insert((revision, index));
	}

	let survivors = visible
		.iter()
		.enumerate()
		.filter(|(index, op)| {
			match op.api_annotation.as_ref().and_then(|a| a.family.as_deref()) {
				Some(family) => winners[family].1 == *index,
				None => !op.deprecated,
			}
		})
		.map(|(_, op)| op.clone())
		.collect_vec();

	debug!(
		target: "dynamic_tools",
		total,
		survivors = survivors.len(),
		"filtered operations"
	);
	survivors
}

#[cfg(test)]
mod tests {
	use super::super::types::{ApiAnnotation, Method};
	use super::*;

	fn op(id: &str) -> ParsedOperation {
		ParsedOperation {
			operation_id: id.to_string(),
			method: Method::Get,
			path: format!("/{{connectionId}}/{id}"),
			summary: None,
			description: None,
			deprecated: false,
			visibility: Visibility::None,
			is_trigger: false,
			api_annotation: None,
			parameters: vec![],
			request_body: None,
			response_schema: None,
		}
	}

	fn family_op(id: &str, family: &str, revision: i64, deprecated: bool) -> ParsedOperation {
		ParsedOperation {
			deprecated,
			api_annotation: Some(ApiAnnotation {
				family: Some(family.to_string()),
				revision,
				status: None,
			}),
			..op(id)
		}
	}

	#[test]
	fn test_internal_trigger_and_subscription_drops() {
		let internal = ParsedOperation { visibility: Visibility::Internal, ..op("Internal") };
		let trigger = ParsedOperation { is_trigger: true, ..op("OnNewEmail") };
		let webhook = ParsedOperation {
			path: "/{connectionId}/$subscriptions/{id}".to_string(),
			..op("DeleteSubscription")
		};
		let kept = op("SendEmail");

		let out = filter_operations(vec![internal, trigger, webhook, kept]);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].operation_id, "SendEmail");
		assert!(out.iter().all(|o| o.visibility != Visibility::Internal));
		assert!(out.iter().all(|o| !o.is_trigger));
		assert!(out.iter().all(|o| !o.path.contains("$subscriptions")));
	}

	#[test]
	fn test_family_dedup_keeps_max_revision() {
		// S3: revision 1 is deprecated, revision 2 survives
		let v1 = family_op("DeleteMessage", "DeleteMessage", 1, true);
		let v2 = family_op("DeleteMessageV2", "DeleteMessage", 2, false);
		let out = filter_operations(vec![v1, v2]);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].operation_id, "DeleteMessageV2");
	}

	#[test]
	fn test_family_tie_keeps_first_seen() {
		let a = family_op("SendA", "Send", 2, false);
		let b = family_op("SendB", "Send", 2, false);
		let out = filter_operations(vec![a, b]);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].operation_id, "SendA");
	}

	#[test]
	fn test_deprecated_without_family_dropped() {
		let deprecated = ParsedOperation { deprecated: true, ..op("OldThing") };
		let current = op("NewThing");
		let out = filter_operations(vec![deprecated, current]);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].operation_id, "NewThing");
	}

	#[test]
	fn test_deprecated_family_winner_survives() {
		// The only member of a family is kept even when deprecated
		let only = family_op("Legacy", "Legacy", 3, true);
		let out = filter_operations(vec![only]);
		assert_eq!(out.len(), 1);
	}

	#[test]
	fn test_order_preserved_across_families() {
		let out = filter_operations(vec![
			family_op("A1", "A", 1, false),
			op("Plain"),
			family_op("A2", "A", 2, false),
			family_op("B1", "B", 1, false),
		]);
		let ids: Vec<&str> = out.iter().map(|o| o.operation_id.as_str()).collect();
		assert_eq!(ids, vec!["Plain", "A2", "B1"]);
	}
}
