//! Checks generated documents against the backend SDL before they are sent.

use graphql_parser::query::{self, Definition, OperationDefinition, Selection, SelectionSet, TypeCondition};
use graphql_parser::schema::{self, Type, TypeDefinition, TypeExtension};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct FieldInfo {
    type_name: String,
    arguments: Vec<String>,
}

#[derive(Debug, Clone)]
enum TypeShape {
    /// Object or interface with selectable fields
    Composite(HashMap<String, FieldInfo>),
    /// Only `__typename` and fragments may be selected
    Union,
    Leaf,
}

/// Field and argument level validation, in the wording the GraphQL
/// reference implementation uses.
pub struct SchemaValidator {
    types: HashMap<String, TypeShape>,
    query_root: String,
    mutation_root: Option<String>,
    subscription_root: Option<String>,
}

fn named_type(ty: &Type<'_, String>) -> String {
    match ty {
        Type::NamedType(name) => name.clone(),
        Type::ListType(inner) | Type::NonNullType(inner) => named_type(inner),
    }
}

fn field_map(fields: &[schema::Field<'_, String>]) -> HashMap<String, FieldInfo> {
    fields
        .iter()
        .map(|f| {
            (
                f.name.clone(),
                FieldInfo {
                    type_name: named_type(&f.field_type),
                    arguments: f.arguments.iter().map(|a| a.name.clone()).collect(),
                },
            )
        })
        .collect()
}

impl SchemaValidator {
    pub fn from_sdl(sdl: &str) -> Result<Self, String> {
        let document = schema::parse_schema::<String>(sdl)
            .map_err(|e| format!("Failed to parse schema: {}", e))?;

        let mut types: HashMap<String, TypeShape> = HashMap::new();
        let mut extensions: Vec<(String, HashMap<String, FieldInfo>)> = Vec::new();
        let mut roots: (Option<String>, Option<String>, Option<String>) = (None, None, None);

        for definition in &document.definitions {
            match definition {
                schema::Definition::SchemaDefinition(sd) => {
                    roots = (sd.query.clone(), sd.mutation.clone(), sd.subscription.clone());
                }
                schema::Definition::TypeDefinition(td) => {
                    let (name, shape) = match td {
                        TypeDefinition::Object(o) => (o.name.clone(), TypeShape::Composite(field_map(&o.fields))),
                        TypeDefinition::Interface(i) => (i.name.clone(), TypeShape::Composite(field_map(&i.fields))),
                        TypeDefinition::Union(u) => (u.name.clone(), TypeShape::Union),
                        TypeDefinition::Scalar(s) => (s.name.clone(), TypeShape::Leaf),
                        TypeDefinition::Enum(e) => (e.name.clone(), TypeShape::Leaf),
                        TypeDefinition::InputObject(i) => (i.name.clone(), TypeShape::Leaf),
                    };
                    types.insert(name, shape);
                }
                schema::Definition::TypeExtension(TypeExtension::Object(ext)) => {
                    extensions.push((ext.name.clone(), field_map(&ext.fields)));
                }
                _ => {}
            }
        }

        for (name, fields) in extensions {
            if let Some(TypeShape::Composite(existing)) = types.get_mut(&name) {
                existing.extend(fields);
            }
        }

        let default_root = |name: &str| types.contains_key(name).then(|| name.to_string());
        let query_root = roots.0.unwrap_or_else(|| "Query".to_string());
        let mutation_root = roots.1.or_else(|| default_root("Mutation"));
        let subscription_root = roots.2.or_else(|| default_root("Subscription"));

        Ok(Self {
            types,
            query_root,
            mutation_root,
            subscription_root,
        })
    }

    /// Every problem found in `document`; empty when it is valid.
    pub fn validate(&self, document: &str) -> Vec<String> {
        let parsed = match query::parse_query::<String>(document) {
            Ok(d) => d,
            Err(e) => return vec![format!("Parse error: {}", e.to_string().trim())],
        };

        let fragments: HashMap<String, (String, &SelectionSet<'_, String>)> = parsed
            .definitions
            .iter()
            .filter_map(|d| match d {
                Definition::Fragment(f) => {
                    let TypeCondition::On(on) = &f.type_condition;
                    Some((f.name.clone(), (on.clone(), &f.selection_set)))
                }
                _ => None,
            })
            .collect();

        let mut errors = Vec::new();
        for definition in &parsed.definitions {
            let Definition::Operation(operation) = definition else {
                continue;
            };
            let (root, selection_set, kind) = match operation {
                OperationDefinition::SelectionSet(set) => (Some(&self.query_root), set, "queries"),
                OperationDefinition::Query(q) => (Some(&self.query_root), &q.selection_set, "queries"),
                OperationDefinition::Mutation(m) => (self.mutation_root.as_ref(), &m.selection_set, "mutations"),
                OperationDefinition::Subscription(s) => {
                    (self.subscription_root.as_ref(), &s.selection_set, "subscriptions")
                }
            };
            match root {
                Some(root) => {
                    let mut visiting = HashSet::new();
                    self.check_selection(root, selection_set, &fragments, &mut visiting, &mut errors);
                }
                None => errors.push(format!("Schema is not configured for {}.", kind)),
            }
        }
        errors
    }

    fn check_selection<'d>(
        &self,
        type_name: &str,
        selection_set: &SelectionSet<'d, String>,
        fragments: &HashMap<String, (String, &SelectionSet<'d, String>)>,
        visiting: &mut HashSet<String>,
        errors: &mut Vec<String>,
    ) {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if field.name == "__typename" {
                        continue;
                    }
                    let info = match self.types.get(type_name) {
                        Some(TypeShape::Composite(fields)) => fields.get(&field.name),
                        Some(TypeShape::Union) => None,
                        // Unknown or leaf parents are reported where they were selected
                        _ => continue,
                    };
                    let Some(info) = info else {
                        errors.push(format!(
                            "Cannot query field \"{}\" on type \"{}\".",
                            field.name, type_name
                        ));
                        continue;
                    };

                    for (argument, _) in &field.arguments {
                        if !info.arguments.contains(argument) {
                            errors.push(format!(
                                "Unknown argument \"{}\" on field \"{}.{}\".",
                                argument, type_name, field.name
                            ));
                        }
                    }

                    if !field.selection_set.items.is_empty() {
                        self.check_selection(&info.type_name, &field.selection_set, fragments, visiting, errors);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let Some((on, set)) = fragments.get(&spread.fragment_name) else {
                        errors.push(format!("Unknown fragment \"{}\".", spread.fragment_name));
                        continue;
                    };
                    if visiting.insert(spread.fragment_name.clone()) {
                        self.check_selection(on, set, fragments, visiting, errors);
                        visiting.remove(&spread.fragment_name);
                    }
                }
                Selection::InlineFragment(inline) => {
                    let on = match &inline.type_condition {
                        Some(TypeCondition::On(on)) => on.as_str(),
                        None => type_name,
                    };
                    self.check_selection(on, &inline.selection_set, fragments, visiting, errors);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
scalar UUID
scalar Date

type Query {
  skills: [Skill!]!
  activeSession: Activity
  events(startDate: Date!, endDate: Date!): [Event!]!
}

type Mutation {
  stopSession(id: UUID!, notes: String): Activity!
}

type Skill {
  id: UUID!
  name: String!
}

type Activity {
  id: UUID!
  name: String!
  skill: Skill
}

type Event {
  id: UUID!
  title: String!
}
"#;

    fn validator() -> SchemaValidator {
        SchemaValidator::from_sdl(SDL).unwrap()
    }

    #[test]
    fn test_valid_documents_pass() {
        let v = validator();
        assert!(v.validate("query { skills { id name __typename } }").is_empty());
        assert!(v
            .validate(r#"mutation { stopSession(id: "a", notes: "Completed") { id skill { name } } }"#)
            .is_empty());
        assert!(v
            .validate("query Q { activeSession { ...A } } fragment A on Activity { id name }")
            .is_empty());
    }

    #[test]
    fn test_unknown_root_field() {
        let errors = validator().validate("query { schedule { id } }");
        assert_eq!(errors, vec![r#"Cannot query field "schedule" on type "Query"."#]);
    }

    #[test]
    fn test_unknown_nested_field_and_argument() {
        let errors = validator().validate(
            "query { events(startDate: \"2026-01-01\", endDate: \"2026-01-02\", type: MEETING) { title location } }",
        );
        assert_eq!(
            errors,
            vec![
                r#"Unknown argument "type" on field "Query.events"."#.to_string(),
                r#"Cannot query field "location" on type "Event"."#.to_string(),
            ]
        );
    }

    #[test]
    fn test_unknown_fragment() {
        let errors = validator().validate("query { activeSession { ...Missing } }");
        assert_eq!(errors, vec![r#"Unknown fragment "Missing"."#]);
    }

    #[test]
    fn test_parse_error() {
        let errors = validator().validate("query { skills { id ");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Parse error: "));
    }

    #[test]
    fn test_bad_schema_is_rejected() {
        assert!(SchemaValidator::from_sdl("type Query {").is_err());
    }
}
