//! ONNX artifact backed by the pure-Rust `tract` runtime.
//!
//! The artifact is the regression exported by the training pipeline: one
//! `int64` input of shape `[1, 1]` (population) and one numeric output whose
//! first element is the predicted yearly visitor count.
//!
//! scikit-learn exports put the regression in an `ai.onnx.ml`
//! `LinearRegressor` node, which tract does not implement. Those nodes are
//! rewritten into `Cast`, `MatMul` and `Add` before the graph is typed.

use std::path::{Path, PathBuf};

use tract_onnx::pb::attribute_proto::AttributeType;
use tract_onnx::pb::tensor_proto::DataType;
use tract_onnx::pb::{AttributeProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto};
use tract_onnx::prelude::*;

use crate::engine::Predictor;
use crate::error::InferenceError;

type Plan = TypedRunnableModel<TypedModel>;

const ML_DOMAIN: &str = "ai.onnx.ml";

/// Opset declared for the default domain when a model only imports
/// `ai.onnx.ml`.
const DEFAULT_OPSET: i64 = 13;

/// An optimized, immutable execution plan. `run` takes `&self`, so one
/// instance serves concurrent callers without locking.
pub struct OnnxModel {
    plan: Plan,
    path: PathBuf,
}

impl OnnxModel {
    /// Parse, type and optimize the model at `path`.
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let proto = tract_onnx::onnx()
            .proto_model_for_path(path)
            .map_err(|e| load_error(path, e.to_string()))?;
        Self::from_proto(proto, path)
    }

    /// Build the plan from an already parsed model. `origin` is only used in
    /// errors and logs.
    pub fn from_proto(mut proto: ModelProto, origin: &Path) -> Result<Self, InferenceError> {
        let lowered =
            lower_linear_regressors(&mut proto).map_err(|reason| load_error(origin, reason))?;
        if lowered > 0 {
            tracing::debug!(lowered, "Rewrote LinearRegressor nodes");
        }

        let plan = tract_onnx::onnx()
            .model_for_proto_model(&proto)
            .and_then(|model| model.with_input_fact(0, i64::fact([1, 1]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| load_error(origin, e.to_string()))?;

        Ok(Self {
            plan,
            path: origin.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Predictor for OnnxModel {
    fn predict_raw(&self, population: i64) -> Result<f64, InferenceError> {
        let run_error = |e: TractError| InferenceError::Run(e.to_string());

        let input: Tensor = tract_ndarray::arr2(&[[population]]).into();
        let outputs = self.plan.run(tvec!(input.into())).map_err(run_error)?;
        let first = outputs
            .first()
            .ok_or_else(|| InferenceError::Run("model returned no outputs".to_string()))?;

        let values = first.cast_to::<f64>().map_err(run_error)?;
        values
            .as_slice::<f64>()
            .map_err(run_error)?
            .first()
            .copied()
            .ok_or_else(|| InferenceError::Run("model output is empty".to_string()))
    }
}

fn load_error(path: &Path, reason: String) -> InferenceError {
    InferenceError::Load {
        path: path.to_path_buf(),
        reason,
    }
}

/// Attributes of an `ai.onnx.ml` `LinearRegressor`: `y = x · Wᵀ + b` with
/// `coefficients` laid out `[targets, features]`.
#[derive(Debug, PartialEq)]
struct LinearRegressor {
    coefficients: Vec<f32>,
    intercepts: Vec<f32>,
    targets: usize,
}

impl LinearRegressor {
    fn from_node(node: &NodeProto) -> Result<Self, String> {
        let attr = |name: &str| node.attribute.iter().find(|a| a.name == name);

        let post_transform = attr("post_transform")
            .map(|a| String::from_utf8_lossy(&a.s).into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "NONE".to_string());
        if post_transform != "NONE" {
            return Err(format!(
                "LinearRegressor post_transform {post_transform} is not supported"
            ));
        }

        let targets = attr("targets").map_or(1, |a| a.i);
        if targets < 1 {
            return Err(format!("LinearRegressor has {targets} targets"));
        }
        let targets = targets as usize;

        let coefficients = attr("coefficients")
            .map(|a| a.floats.clone())
            .unwrap_or_default();
        if coefficients.is_empty() || coefficients.len() % targets != 0 {
            return Err(format!(
                "LinearRegressor has {} coefficients for {targets} targets",
                coefficients.len()
            ));
        }

        let intercepts = attr("intercepts")
            .map(|a| a.floats.clone())
            .unwrap_or_default();
        let intercepts = match intercepts.len() {
            0 => vec![0.0; targets],
            n if n == targets => intercepts,
            n => return Err(format!("LinearRegressor has {n} intercepts for {targets} targets")),
        };

        Ok(Self {
            coefficients,
            intercepts,
            targets,
        })
    }

    fn features(&self) -> usize {
        self.coefficients.len() / self.targets
    }

    /// Coefficients transposed to `[features, targets]` for `MatMul`.
    fn weights(&self) -> Vec<f32> {
        let features = self.features();
        (0..features)
            .flat_map(|f| (0..self.targets).map(move |t| self.coefficients[t * features + f]))
            .collect()
    }

    /// Replacement nodes plus the initializers they read.
    fn lower(&self, node: &NodeProto) -> Result<(Vec<NodeProto>, Vec<TensorProto>), String> {
        let (Some(input), Some(output)) = (node.input.first(), node.output.first()) else {
            return Err("LinearRegressor needs one input and one output".to_string());
        };
        let prefix = if node.name.is_empty() {
            output.clone()
        } else {
            node.name.clone()
        };
        let cast = format!("{prefix}_float");
        let weights = format!("{prefix}_weights");
        let product = format!("{prefix}_product");
        let bias = format!("{prefix}_bias");

        let nodes = vec![
            plain_node(
                &cast,
                "Cast",
                vec![input.clone()],
                vec![cast.clone()],
                vec![AttributeProto {
                    name: "to".to_string(),
                    r#type: AttributeType::Int as i32,
                    i: DataType::Float as i64,
                    ..Default::default()
                }],
            ),
            plain_node(
                &product,
                "MatMul",
                vec![cast.clone(), weights.clone()],
                vec![product.clone()],
                Vec::new(),
            ),
            plain_node(
                &format!("{prefix}_add"),
                "Add",
                vec![product, bias.clone()],
                vec![output.clone()],
                Vec::new(),
            ),
        ];
        let initializers = vec![
            float_tensor(
                weights,
                vec![self.features() as i64, self.targets as i64],
                self.weights(),
            ),
            float_tensor(bias, vec![self.targets as i64], self.intercepts.clone()),
        ];
        Ok((nodes, initializers))
    }
}

/// Replace every `LinearRegressor` in the main graph with standard operators.
/// Returns how many nodes were rewritten.
fn lower_linear_regressors(proto: &mut ModelProto) -> Result<usize, String> {
    let Some(graph) = proto.graph.as_mut() else {
        return Ok(0);
    };

    let mut lowered = 0;
    let mut nodes = Vec::with_capacity(graph.node.len());
    for node in std::mem::take(&mut graph.node) {
        if node.op_type != "LinearRegressor" || node.domain != ML_DOMAIN {
            nodes.push(node);
            continue;
        }
        let (replacement, initializers) = LinearRegressor::from_node(&node)?.lower(&node)?;
        nodes.extend(replacement);
        graph.initializer.extend(initializers);
        lowered += 1;
    }
    graph.node = nodes;

    let imports_default = proto
        .opset_import
        .iter()
        .any(|opset| opset.domain.is_empty() || opset.domain == "ai.onnx");
    if lowered > 0 && !imports_default {
        proto.opset_import.push(OperatorSetIdProto {
            domain: String::new(),
            version: DEFAULT_OPSET,
        });
    }
    Ok(lowered)
}

fn plain_node(
    name: &str,
    op_type: &str,
    input: Vec<String>,
    output: Vec<String>,
    attribute: Vec<AttributeProto>,
) -> NodeProto {
    NodeProto {
        name: name.to_string(),
        op_type: op_type.to_string(),
        input,
        output,
        attribute,
        ..Default::default()
    }
}

fn float_tensor(name: String, dims: Vec<i64>, float_data: Vec<f32>) -> TensorProto {
    TensorProto {
        name,
        dims,
        data_type: DataType::Float as i32,
        float_data,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tract_onnx::pb::tensor_shape_proto::{dimension, Dimension};
    use tract_onnx::pb::{type_proto, GraphProto, TensorShapeProto, TypeProto, ValueInfoProto};

    fn tensor_value(name: &str, elem_type: DataType) -> ValueInfoProto {
        // Batch dimension left unnamed, as the converter does for `None`.
        let dim = |value| Dimension {
            value,
            ..Default::default()
        };
        ValueInfoProto {
            name: name.to_string(),
            r#type: Some(TypeProto {
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: elem_type as i32,
                    shape: Some(TensorShapeProto {
                        dim: vec![
                            dim(None),
                            dim(Some(dimension::Value::DimValue(1))),
                        ],
                    }),
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn floats(name: &str, values: Vec<f32>) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Floats as i32,
            floats: values,
            ..Default::default()
        }
    }

    fn regressor_node(attribute: Vec<AttributeProto>) -> NodeProto {
        NodeProto {
            name: "LinearRegressor".to_string(),
            op_type: "LinearRegressor".to_string(),
            domain: ML_DOMAIN.to_string(),
            input: vec!["cast_input".to_string()],
            output: vec!["variable".to_string()],
            attribute,
            ..Default::default()
        }
    }

    /// The graph scikit-learn's converter emits for a one-feature
    /// `LinearRegression` with an `int64` input: Cast, then LinearRegressor.
    fn sklearn_export(coefficient: f32, intercept: f32) -> ModelProto {
        let cast = NodeProto {
            name: "Cast".to_string(),
            op_type: "Cast".to_string(),
            input: vec!["population".to_string()],
            output: vec!["cast_input".to_string()],
            attribute: vec![AttributeProto {
                name: "to".to_string(),
                r#type: AttributeType::Int as i32,
                i: DataType::Float as i64,
                ..Default::default()
            }],
            ..Default::default()
        };
        let regressor = regressor_node(vec![
            floats("coefficients", vec![coefficient]),
            floats("intercepts", vec![intercept]),
        ]);

        ModelProto {
            ir_version: 8,
            producer_name: "skl2onnx".to_string(),
            opset_import: vec![
                OperatorSetIdProto {
                    domain: String::new(),
                    version: 13,
                },
                OperatorSetIdProto {
                    domain: ML_DOMAIN.to_string(),
                    version: 1,
                },
            ],
            graph: Some(GraphProto {
                name: "linear_regression".to_string(),
                node: vec![cast, regressor],
                input: vec![tensor_value("population", DataType::Int64)],
                output: vec![tensor_value("variable", DataType::Float)],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn sklearn_linear_regression_loads_and_predicts() {
        let model = OnnxModel::from_proto(sklearn_export(0.25, 1_000.0), Path::new("model.onnx"))
            .unwrap();

        let raw = model.predict_raw(500_000).unwrap();
        assert!((raw - 126_000.0).abs() < 1.0, "unexpected prediction {raw}");
        assert_eq!(model.path(), Path::new("model.onnx"));
    }

    #[test]
    fn predictions_follow_the_regression_line() {
        let model =
            OnnxModel::from_proto(sklearn_export(0.5, -10.0), Path::new("model.onnx")).unwrap();
        assert!((model.predict_raw(0).unwrap() + 10.0).abs() < 1e-3);
        assert!((model.predict_raw(100).unwrap() - 40.0).abs() < 1e-3);
    }

    #[test]
    fn regressor_without_default_opset_gets_one() {
        let mut proto = sklearn_export(1.0, 0.0);
        proto.opset_import.retain(|opset| opset.domain == ML_DOMAIN);

        assert_eq!(lower_linear_regressors(&mut proto).unwrap(), 1);
        assert!(proto
            .opset_import
            .iter()
            .any(|opset| opset.domain.is_empty() && opset.version == DEFAULT_OPSET));
    }

    #[test]
    fn lowering_replaces_the_regressor() {
        let mut proto = sklearn_export(2.0, 3.0);
        lower_linear_regressors(&mut proto).unwrap();

        let graph = proto.graph.unwrap();
        let ops: Vec<&str> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, vec!["Cast", "Cast", "MatMul", "Add"]);
        assert_eq!(graph.node.last().unwrap().output, vec!["variable".to_string()]);
        assert_eq!(graph.initializer.len(), 2);
    }

    #[test]
    fn coefficients_are_transposed_per_target() {
        let node = regressor_node(vec![
            // Two targets, three features.
            floats("coefficients", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            AttributeProto {
                name: "targets".to_string(),
                r#type: AttributeType::Int as i32,
                i: 2,
                ..Default::default()
            },
        ]);
        let regressor = LinearRegressor::from_node(&node).unwrap();
        assert_eq!(regressor.features(), 3);
        assert_eq!(regressor.weights(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(regressor.intercepts, vec![0.0, 0.0]);
    }

    #[test]
    fn unsupported_post_transform_is_a_load_error() {
        let mut proto = sklearn_export(1.0, 0.0);
        proto.graph.as_mut().unwrap().node[1]
            .attribute
            .push(AttributeProto {
                name: "post_transform".to_string(),
                r#type: AttributeType::String as i32,
                s: b"PROBIT".to_vec(),
                ..Default::default()
            });

        let err = OnnxModel::from_proto(proto, Path::new("model.onnx")).err().unwrap();
        assert_matches!(err, InferenceError::Load { ref reason, .. } if reason.contains("PROBIT"));
    }

    #[test]
    fn mismatched_intercepts_are_rejected() {
        let node = regressor_node(vec![
            floats("coefficients", vec![1.0]),
            floats("intercepts", vec![1.0, 2.0]),
        ]);
        assert!(LinearRegressor::from_node(&node).is_err());
    }
}
